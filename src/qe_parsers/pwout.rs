//! Quantities read from the standard output of pw.x.

use std::{
    fs,
    path::Path,
};

use log::info;

use crate::error::{
    QeError,
    Result,
};


#[derive(Debug, Clone, PartialEq)]
pub struct PwOut {
    fermi: Option<f64>,
}


impl PwOut {
    pub fn from_file(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QeError::FileNotFound { path: path.to_path_buf() });
        }
        info!("Reading pw.x output {:?}", path);
        Self::from_text(&fs::read_to_string(path)?)
    }

    pub fn from_text(txt: &str) -> Result<Self> {
        let fermi = regex!(r"the Fermi energy is\s+(\S+)\s+ev")
            .captures_iter(txt)
            .last()
            .map(|caps| caps[1].parse::<f64>().map_err(|_| QeError::unrecognized(&caps[0])))
            .transpose()?;
        Ok(Self { fermi })
    }

    /// Fermi energy of the last SCF cycle in eV.
    pub fn fermi_energy(&self) -> Result<f64> {
        self.fermi.ok_or_else(|| QeError::InvalidState("no Fermi energy in pw.x output".to_string()))
    }
}
