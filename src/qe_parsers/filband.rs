//! `filband` written by bands.x: a `&plot nbnd=  60, nks=   274 /` header, then for every
//! k-point one coordinate line followed by the energies, ten per line.

use std::{
    fs,
    path::Path,
};

use log::info;

use crate::{
    error::{
        QeError,
        Result,
    },
    types::{
        MatX3,
        Matrix,
    },
};


#[derive(Debug, Clone, PartialEq)]
pub struct Filband {
    pub nbnd:    usize,
    pub nks:     usize,
    pub kpoints: MatX3<f64>,
    /// [ikpoint, iband] in eV.
    pub bands:   Matrix<f64>,
    pub e_min:   f64,
    pub e_max:   f64,
}


impl Filband {
    pub fn from_file(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QeError::FileNotFound { path: path.to_path_buf() });
        }
        info!("Reading filband {:?}", path);
        Self::from_text(&fs::read_to_string(path)?)
    }

    pub fn from_text(txt: &str) -> Result<Self> {
        let mut lines = txt.lines();
        let header = lines.next().ok_or_else(|| QeError::unrecognized(""))?;
        let (nbnd, nks) = Self::parse_header(header)?;

        let lines_per_k = (nbnd + 9) / 10;
        let mut kpoints = MatX3::<f64>::with_capacity(nks);
        let mut bands = Matrix::<f64>::zeros((nks, nbnd));

        for ik in 0 .. nks {
            let kline = lines.next()
                .ok_or_else(|| QeError::InvalidState(format!("filband ends before k-point #{}", ik + 1)))?;
            let k = parse_floats(kline)?;
            if k.len() != 3 {
                return Err(QeError::unrecognized(kline));
            }
            kpoints.push([k[0], k[1], k[2]]);

            let mut energies = Vec::with_capacity(nbnd);
            for _ in 0 .. lines_per_k {
                let line = lines.next()
                    .ok_or_else(|| QeError::InvalidState(format!("filband ends inside k-point #{}", ik + 1)))?;
                energies.extend(parse_floats(line)?);
            }
            if energies.len() != nbnd {
                return Err(QeError::InvalidState(
                    format!("k-point #{} has {} energies, expected {}", ik + 1, energies.len(), nbnd)));
            }
            bands.row_mut(ik).iter_mut().zip(energies).for_each(|(x, e)| *x = e);
        }

        let e_min = bands.iter().cloned().fold(f64::INFINITY, f64::min);
        let e_max = bands.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self { nbnd, nks, kpoints, bands, e_min, e_max })
    }

    fn parse_header(line: &str) -> Result<(usize, usize)> {
        if let Some(caps) = regex!(r"nbnd\s*=\s*(\d+)\s*,\s*nks\s*=\s*(\d+)").captures(line) {
            return Ok((caps[1].parse().map_err(|_| QeError::unrecognized(line))?,
                       caps[2].parse().map_err(|_| QeError::unrecognized(line))?));
        }

        // bands.x summary style: "...,    60 bands,   274 k-points, ..."
        let caps = regex!(r"(\d+)\s+bands\s*,\s*(\d+)\s+k-points")
            .captures(line)
            .ok_or_else(|| QeError::unrecognized(line))?;
        Ok((caps[1].parse().map_err(|_| QeError::unrecognized(line))?,
            caps[2].parse().map_err(|_| QeError::unrecognized(line))?))
    }
}


fn parse_floats(line: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|t| t.parse::<f64>().map_err(|_| QeError::unrecognized(line)))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#" &plot nbnd=  12, nks=     2 /
            0.000000  0.000000  0.000000
   -5.823    6.254    6.254    6.254    8.803    8.803    8.803    9.533   13.799   13.799
   14.000   15.100
            0.500000  0.500000  0.500000
   -3.419   -0.886    5.009    5.009    7.708    9.578    9.578   13.561   16.988   17.100
   17.200   18.300
"#;

    #[test]
    fn test_read_filband() {
        let f = Filband::from_text(SAMPLE).unwrap();
        assert_eq!((f.nbnd, f.nks), (12, 2));
        assert_eq!(f.kpoints[1], [0.5, 0.5, 0.5]);
        assert_eq!(f.bands[[0, 11]], 15.1);
        assert_eq!(f.bands[[1, 0]], -3.419);
        assert_eq!(f.e_min, -5.823);
        assert_eq!(f.e_max, 18.3);
    }

    #[test]
    fn test_header_forms() {
        assert_eq!(Filband::parse_header(" &plot nbnd=  60, nks=   274 /").unwrap(), (60, 274));
        assert_eq!(Filband::parse_header(" &plot nbnd=60,nks=3 /").unwrap(), (60, 3));
        assert_eq!(Filband::parse_header(" bands:    60 bands,   274 k-points, 3 dims").unwrap(), (60, 274));
        assert!(Filband::parse_header(" &plot /").is_err());
    }

    #[test]
    fn test_truncated() {
        let truncated = SAMPLE.lines().take(5).collect::<Vec<_>>().join("\n");
        assert!(matches!(Filband::from_text(&truncated), Err(QeError::InvalidState(_))));
    }
}
