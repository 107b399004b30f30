//! Rank orbitals by how much they contribute to the states inside an energy window.

use std::{
    fmt,
    str::FromStr,
};

use ndarray::{
    s,
    ArrayView1,
    Axis,
};
use log::{
    debug,
    info,
    warn,
};

use crate::{
    error::{
        QeError,
        Result,
    },
    types::Vector,
    qe_parsers::{
        pdos::PdosFile,
        projwfc::ProjwfcOut,
    },
};


/// Reduction of the in-window (energy, density) samples of an orbital to one number.
pub type Reduction = Box<dyn Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64>;


pub enum ContributionType {
    /// Peak density in the window.
    Max,
    /// Density integrated over energy: Simpson's rule, with a trapezoid on the last interval
    /// when the number of samples is even.
    Integral,
    /// Called with the in-window energies and densities.
    Custom(Reduction),
}


impl fmt::Debug for ContributionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Max       => write!(f, "Max"),
            Self::Integral  => write!(f, "Integral"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}


impl FromStr for ContributionType {
    type Err = QeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max"      => Ok(Self::Max),
            "integral" => Ok(Self::Integral),
            other      => Err(QeError::Parse(format!("unknown contribution type '{}', expected max or integral", other))),
        }
    }
}


/// One ranked orbital: its index in the ranked collection and its contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub index: usize,
    pub value: f64,
}


#[derive(Debug)]
pub struct ContributionRanker {
    pub rule:   ContributionType,
    /// Inclusive bounds on `E - fermi`, `None` covers the whole spectrum.
    pub window: Option<(f64, f64)>,
    /// Reference energy. When unset, projections use the Fermi energy of the output they come
    /// from and pdos files use 0.
    pub fermi:  Option<f64>,
}


impl ContributionRanker {
    pub fn new(rule: ContributionType) -> Self {
        Self { rule, window: None, fermi: None }
    }

    pub fn with_window(mut self, lo: f64, hi: f64) -> Self {
        self.window = Some((lo, hi));
        self
    }

    pub fn with_fermi(mut self, fermi: f64) -> Self {
        self.fermi = Some(fermi);
        self
    }

    /// Indices of the samples of `energies` falling inside the window.
    pub fn window_indices(&self, energies: ArrayView1<f64>) -> Result<Vec<usize>> {
        self.window_indices_from(energies, self.fermi.unwrap_or(0.0))
    }

    fn window_indices_from(&self, energies: ArrayView1<f64>, fermi: f64) -> Result<Vec<usize>> {
        let (lo, hi) = self.window.unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
        let empty = || QeError::EmptyWindow { lo, hi };
        if lo > hi {
            return Err(empty());
        }

        let indices = energies.iter()
            .enumerate()
            .filter(|&(_, &e)| (lo ..= hi).contains(&(e - fermi)))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();

        if indices.is_empty() {
            return Err(empty());
        }
        Ok(indices)
    }

    /// Apply the rule to samples already restricted to the window.
    pub fn reduce(&self, energies: ArrayView1<f64>, values: ArrayView1<f64>) -> f64 {
        match &self.rule {
            ContributionType::Max      => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            ContributionType::Integral => simpson(energies, values),
            ContributionType::Custom(f) => f(energies, values),
        }
    }

    /// Rank pdos files by the contribution of their local DOS (column 1).
    ///
    /// Files are read again on every call, each file is windowed on its own energy axis.
    pub fn rank_pdos_files(&self, files: &[PdosFile]) -> Result<Vec<Contribution>> {
        info!("Ranking {} pdos files with {:?} in window {:?} (fermi = {})",
              files.len(), self.rule, self.window, self.fermi.unwrap_or(0.0));

        let mut ret = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let (energies, ldos) = file.load_ldos()?;
            let iwin = self.window_indices(energies.view())?;
            let value = self.reduce(energies.select(Axis(0), &iwin).view(),
                                    ldos.select(Axis(0), &iwin).view());
            debug!("{} -> {}", file.file_name(), value);
            ret.push(Contribution { index, value });
        }

        sort_descending(&mut ret);
        Ok(ret)
    }

    /// Rank the atomic wavefunctions of a parsed projwfc.x output.
    ///
    /// Every (k, band) state of a decoded k-point whose eigenvalue lies in the window is a
    /// sample. `Max` takes the largest projection, `Integral` the sum of projections averaged
    /// over the decoded k-points and `Custom` receives the sample eigenvalues and projections
    /// in (k, band) order.
    pub fn rank_projections(&self, out: &ProjwfcOut) -> Result<Vec<Contribution>> {
        let p = out.projections()?;
        let nk_read = p.nk_read.min(p.eigs.nrows());
        if nk_read < out.nk() {
            warn!("Ranking over {} of {} k-points, the rest were not decoded", nk_read, out.nk());
        }
        let fermi = self.fermi.unwrap_or(out.fermi);
        let nk = nk_read.max(1) as f64;

        let eigs = p.eigs.slice(s![.. nk_read, ..]);
        let (ks, bs): (Vec<usize>, Vec<usize>) = eigs.indexed_iter()
            .map(|(idx, _)| idx)
            .unzip();
        let energies = eigs.iter().cloned().collect::<Vector<f64>>();
        let iwin = self.window_indices_from(energies.view(), fermi)?;
        let energies = energies.select(Axis(0), &iwin);

        let mut ret = (0 .. out.natomwfc())
            .map(|iwfc| {
                let weights = iwin.iter()
                    .map(|&i| p.proj[[ks[i], bs[i], iwfc]])
                    .collect::<Vector<f64>>();
                let value = match &self.rule {
                    ContributionType::Integral => weights.sum() / nk,
                    _ => self.reduce(energies.view(), weights.view()),
                };
                Contribution { index: iwfc, value }
            })
            .collect::<Vec<_>>();

        sort_descending(&mut ret);
        Ok(ret)
    }
}


/// Descending by value, ties keep ascending index order.
fn sort_descending(v: &mut [Contribution]) {
    v.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.index.cmp(&b.index)));
}


/// Composite Simpson's rule on a possibly non-uniform grid.
pub fn simpson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    let n = x.len().min(y.len());
    match n {
        0 | 1 => return 0.0,
        2 => return trapezoid(x[0], x[1], y[0], y[1]),
        _ => {},
    }

    // Simpson needs an even number of intervals.
    let nsimp = if n % 2 == 1 { n } else { n - 1 };
    let mut sum = 0.0;
    for i in (0 .. nsimp - 2).step_by(2) {
        let h0 = x[i + 1] - x[i];
        let h1 = x[i + 2] - x[i + 1];
        if h0 == 0.0 || h1 == 0.0 {
            sum += trapezoid(x[i], x[i + 1], y[i], y[i + 1])
                 + trapezoid(x[i + 1], x[i + 2], y[i + 1], y[i + 2]);
            continue;
        }
        let hs = h0 + h1;
        sum += hs / 6.0 * ((2.0 - h1 / h0) * y[i]
                           + hs * hs / (h0 * h1) * y[i + 1]
                           + (2.0 - h0 / h1) * y[i + 2]);
    }

    if nsimp < n {
        sum += trapezoid(x[n - 2], x[n - 1], y[n - 2], y[n - 1]);
    }
    sum
}


fn trapezoid(x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    0.5 * (x1 - x0) * (y0 + y1)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs,
        path::Path,
    };
    use approx::assert_relative_eq;
    use ndarray::arr1;
    use tempdir::TempDir;

    fn write_pdos(dir: &Path, name: &str, f: impl Fn(f64) -> f64) -> PdosFile {
        let mut txt = String::from("# E (eV)  ldos(E)  pdos(E)\n");
        for i in 0 ..= 20 {
            let e = -1.0 + 0.1 * i as f64;
            txt.push_str(&format!("{:8.3} {:12.6} {:12.6}\n", e, f(e), f(e)));
        }
        let path = dir.join(name);
        fs::write(&path, txt).unwrap();
        PdosFile::from_path(&path).unwrap()
    }

    #[test]
    fn test_simpson() {
        let x = arr1(&[0.0, 0.5, 1.0, 1.5, 2.0]);
        let y = x.mapv(|v| v * v);
        assert_relative_eq!(simpson(x.view(), y.view()), 8.0 / 3.0, epsilon = 1e-12);

        let x = arr1(&[0.0, 1.0]);
        assert_relative_eq!(simpson(x.view(), arr1(&[1.0, 3.0]).view()), 2.0);

        // even number of samples, linear data is exact
        let x = arr1(&[0.0, 1.0, 2.0, 3.0]);
        assert_relative_eq!(simpson(x.view(), x.view()), 4.5, epsilon = 1e-12);

        let x = arr1(&[0.0, 0.1, 0.3, 0.6, 1.0]);
        let y = x.mapv(|v| 3.0 * v * v);
        assert_relative_eq!(simpson(x.view(), y.view()), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_window() {
        let ranker = ContributionRanker::new(ContributionType::Max).with_window(-0.5, 0.5).with_fermi(1.0);
        let e = arr1(&[0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(ranker.window_indices(e.view()).unwrap(), vec![1, 2, 3]);

        let ranker = ContributionRanker::new(ContributionType::Max).with_window(0.5, -0.5);
        assert!(matches!(ranker.window_indices(e.view()), Err(QeError::EmptyWindow { .. })));

        let ranker = ContributionRanker::new(ContributionType::Max).with_window(10.0, 11.0);
        assert!(matches!(ranker.window_indices(e.view()), Err(QeError::EmptyWindow { .. })));

        let ranker = ContributionRanker::new(ContributionType::Max);
        assert_eq!(ranker.window_indices(e.view()).unwrap().len(), 5);
    }

    #[test]
    fn test_rank_pdos_files() {
        let dir = TempDir::new("test_rank").unwrap();
        let files = vec![
            write_pdos(dir.path(), "x.pdos_atm#1(Si)_wfc#1(s)", |e| 0.1 + 0.0 * e),
            write_pdos(dir.path(), "x.pdos_atm#1(Si)_wfc#2(p)", |e| if e > 0.45 { 2.0 } else { 0.0 }),
            write_pdos(dir.path(), "x.pdos_atm#2(Si)_wfc#1(s)", |e| (-e * e * 10.0).exp()),
        ];

        let ranked = ContributionRanker::new(ContributionType::Max)
            .with_window(-0.5, 0.5)
            .rank_pdos_files(&files)
            .unwrap();
        let order = ranked.iter().map(|c| c.index).collect::<Vec<_>>();
        assert_eq!(order, vec![1, 2, 0]);
        assert_relative_eq!(ranked[0].value, 2.0);
        assert_relative_eq!(ranked[1].value, 1.0);

        let ranked = ContributionRanker::new(ContributionType::Integral)
            .with_window(-0.55, 0.55)
            .rank_pdos_files(&files)
            .unwrap();
        assert_eq!(ranked[0].index, 2);
        assert_relative_eq!(ranked.iter().find(|c| c.index == 0).unwrap().value, 0.1, epsilon = 1e-6);

        let ranker = ContributionRanker::new(ContributionType::Custom(Box::new(|_: ArrayView1<f64>, y: ArrayView1<f64>| y.len() as f64)))
            .with_window(0.0, 0.25);
        let ranked = ranker.rank_pdos_files(&files).unwrap();
        assert!(ranked.iter().all(|c| c.value == 3.0));
        assert_eq!(ranked.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);

        assert!(ContributionRanker::new(ContributionType::Integral)
                .with_window(0.5, -0.5)
                .rank_pdos_files(&files)
                .is_err());
    }

    #[test]
    fn test_rank_projections() {
        let txt = r#"
     Problem Sizes
     natomwfc =            2
     nbnd     =            2
     nkstot   =            2
     npwx     =           10
     nkb      =            2

     Atomic states used for projection
     (read from pseudopotential files):

     state #   1: atom   1 (Si ), wfc  1 (l=0 m= 1)
     state #   2: atom   1 (Si ), wfc  2 (l=1 m= 1)

 k =   0.0000000000  0.0000000000  0.0000000000
==== e(   1) =    -1.00000 eV ====
     psi = 0.900*[#   1]+0.100*[#   2]+
    |psi|^2 = 1.000
==== e(   2) =     1.00000 eV ====
     psi = 0.200*[#   1]+0.700*[#   2]+
    |psi|^2 = 0.900

 k =   0.5000000000  0.0000000000  0.0000000000
Lowdin Charges:
"#;
        let mut out = ProjwfcOut::from_text(txt).unwrap();
        out.read_projections().unwrap();

        let ranked = ContributionRanker::new(ContributionType::Max)
            .with_window(0.0, 2.0)
            .rank_projections(&out)
            .unwrap();
        assert_eq!(ranked[0], Contribution { index: 1, value: 0.7 });

        let ranked = ContributionRanker::new(ContributionType::Integral)
            .rank_projections(&out)
            .unwrap();
        assert_eq!(ranked[0].index, 0);
        assert_relative_eq!(ranked[0].value, 1.1);
        assert_relative_eq!(ranked[1].value, 0.8);

        // the output's Fermi energy applies unless the ranker sets its own
        let out = out.with_fermi(1.0);
        let ranked = ContributionRanker::new(ContributionType::Max)
            .with_window(-2.5, -1.5)
            .rank_projections(&out)
            .unwrap();
        assert_eq!(ranked[0], Contribution { index: 0, value: 0.9 });

        let err = ContributionRanker::new(ContributionType::Max)
            .with_window(-2.5, -1.5)
            .with_fermi(0.0)
            .rank_projections(&out)
            .unwrap_err();
        assert!(matches!(err, QeError::EmptyWindow { .. }));
    }

    #[test]
    fn test_from_str() {
        assert!(matches!("MAX".parse::<ContributionType>(), Ok(ContributionType::Max)));
        assert!(matches!("integral".parse::<ContributionType>(), Ok(ContributionType::Integral)));
        assert!("mean".parse::<ContributionType>().is_err());
    }
}
