//! Per-orbital projected DOS files written by projwfc.x, named like
//! `prefix.pdos_atm#1(Si)_wfc#2(p)`.

use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use log::{
    debug,
    warn,
};

use crate::{
    error::{
        QeError,
        Result,
    },
    types::{
        Vector,
        Matrix,
    },
    qe_parsers::pwin::InputDeck,
};


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdosFile {
    pub path:    PathBuf,
    /// Atom serial in the file name, counts from 1.
    pub iatom:   usize,
    pub element: String,
    /// Wavefunction serial of this atom in the file name, counts from 1.
    pub iwfc:    usize,
    /// Angular momentum label, `s`, `p`, `d`, ... or `s_j0.5` for spin-orbit runs.
    pub angular: String,
}


impl PdosFile {
    /// Returns `None` when the file name does not look like a pdos file.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let caps = regex!(r"\.pdos_atm#([0-9]+)\(([^)]*)\)_wfc#([0-9]+)\(([^)]*)\)").captures(name)?;
        Some(Self {
            path:    path.to_path_buf(),
            iatom:   caps[1].parse().ok()?,
            element: caps[2].to_string(),
            iwfc:    caps[3].parse().ok()?,
            angular: caps[4].to_string(),
        })
    }

    /// All pdos files in `dir`, sorted by (atom, wavefunction).
    pub fn discover(dir: &(impl AsRef<Path> + ?Sized)) -> Result<Vec<Self>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(QeError::FileNotFound { path: dir.to_path_buf() });
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(f) = Self::from_path(&path) {
                files.push(f);
            }
        }
        files.sort_by(|a, b| (a.iatom, a.iwfc, &a.path).cmp(&(b.iatom, b.iwfc, &b.path)));

        if files.is_empty() {
            warn!("No pdos file found in {:?}", dir);
        } else {
            debug!("{} pdos files found in {:?}", files.len(), dir);
        }
        Ok(files)
    }

    pub fn file_name(&self) -> String {
        self.path.file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `1(s)`
    pub fn wfc_label(&self) -> String {
        format!("{}({})", self.iwfc, self.angular)
    }

    /// Read all numeric columns, lines starting with `#` are skipped.
    pub fn load(&self) -> Result<Matrix<f64>> {
        if !self.path.is_file() {
            return Err(QeError::FileNotFound { path: self.path.clone() });
        }
        parse_columns(&fs::read_to_string(&self.path)?)
    }

    /// Energy axis and local DOS (columns 0 and 1).
    pub fn load_ldos(&self) -> Result<(Vector<f64>, Vector<f64>)> {
        let data = self.load()?;
        Ok((data.column(0).to_owned(), data.column(1).to_owned()))
    }
}


fn parse_columns(txt: &str) -> Result<Matrix<f64>> {
    let mut ncol = 0usize;
    let mut nrow = 0usize;
    let mut values = Vec::<f64>::new();

    for line in txt.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let row = line.split_whitespace()
            .map(|t| t.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| QeError::unrecognized(line))?;

        if nrow == 0 {
            ncol = row.len();
            if ncol < 2 {
                return Err(QeError::unrecognized(line));
            }
        } else if row.len() != ncol {
            return Err(QeError::unrecognized(line));
        }

        values.extend(row);
        nrow += 1;
    }

    if nrow == 0 {
        return Err(QeError::InvalidState("no data rows in pdos file".to_string()));
    }

    Matrix::from_shape_vec((nrow, ncol), values)
        .map_err(|e| QeError::Parse(e.to_string()))
}


/// Human readable identity of a pdos file.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitalLabel {
    pub iatom: usize,
    /// Element and position of the atom when an input deck is available.
    pub site:  Option<(String, [f64; 3])>,
    pub wfc:   String,
    /// `{element}_{x}_{y}_{z}_{wfc}`, or the file name without a deck.
    pub label: String,
}


impl OrbitalLabel {
    pub fn build(files: &[PdosFile], deck: Option<&InputDeck>) -> Result<Vec<Self>> {
        let positions = match deck {
            Some(d) => Some(d.atom_positions()?),
            None    => None,
        };

        files.iter()
            .map(|f| {
                let wfc = f.wfc_label();
                let Some(positions) = positions.as_ref() else {
                    return Ok(Self { iatom: f.iatom, site: None, wfc, label: f.file_name() });
                };

                let atom = f.iatom.checked_sub(1)
                    .and_then(|i| positions.get(i))
                    .ok_or_else(|| QeError::InvalidState(
                        format!("atom #{} of {} is not in ATOMIC_POSITIONS ({} atoms)",
                                f.iatom, f.file_name(), positions.len())))?;
                let [x, y, z] = atom.position;
                let label = format!("{}_{:?}_{:?}_{:?}_{}", atom.symbol, x, y, z, wfc);
                Ok(Self {
                    iatom: f.iatom,
                    site:  Some((atom.symbol.clone(), atom.position)),
                    wfc,
                    label,
                })
            })
            .collect()
    }
}
