use std::path::PathBuf;

use clap::Args;
use log::{
    info,
    warn,
};
use anyhow::Result;
use ndarray::Array1;

use crate::{
    OptProcess,
    Filband,
    ProjwfcInput,
    commands::common::{
        resolve_fermi,
        write_columns_to_txt,
    },
};


#[derive(Debug, Args)]
/// Summarize the band structure written by bands.x.
pub struct Band {
    #[arg(default_value = "./bands.dat")]
    /// `filband` written by bands.x
    filband: PathBuf,

    #[arg(long, allow_hyphen_values = true)]
    /// Fermi energy in eV
    fermi: Option<f64>,

    #[arg(long)]
    /// Read the Fermi energy from this pw.x output
    pwout: Option<PathBuf>,

    #[arg(long)]
    /// projwfc.x input, checks that its `filproj` belongs to this filband
    projwfc_in: Option<PathBuf>,

    #[arg(long)]
    /// Write k-path length and the band energies to a text file
    txtout: Option<PathBuf>,
}


impl OptProcess for Band {
    fn process(&self) -> Result<()> {
        let fermi = resolve_fermi(self.fermi, self.pwout.as_deref())?;
        let band = Filband::from_file(&self.filband)?;

        println!("nbnd = {}, nks = {}", band.nbnd, band.nks);
        println!("E_min = {:.4} eV, E_max = {:.4} eV (E - Ef: {:.4} .. {:.4})",
                 band.e_min, band.e_max, band.e_min - fermi, band.e_max - fermi);

        if let Some(path) = self.projwfc_in.as_ref() {
            let input = ProjwfcInput::from_namelist_file(path)?;
            let name = self.filband.file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if input.check_file_compat_with_bandsx(&name) {
                info!("filproj of {:?} matches {:?}", path, &self.filband);
            } else {
                warn!("filproj of {:?} ({:?}) does not belong to {:?}", path, input.filproj, name);
            }
        }

        if let Some(txtout) = self.txtout.as_ref() {
            let mut kpath = Vec::with_capacity(band.nks);
            let mut acc = 0.0;
            for (ik, k) in band.kpoints.iter().enumerate() {
                if ik > 0 {
                    let p = band.kpoints[ik - 1];
                    acc += ((k[0] - p[0]).powi(2) + (k[1] - p[1]).powi(2) + (k[2] - p[2]).powi(2)).sqrt();
                }
                kpath.push(acc);
            }
            let kpath = Array1::from(kpath);
            let columns = band.bands.columns().into_iter()
                .map(|c| c.mapv(|e| e - fermi))
                .collect::<Vec<_>>();

            let labels = (1 ..= band.nbnd).map(|ib| format!("E{}-Ef(eV)", ib)).collect::<Vec<_>>();
            let header = std::iter::once("kpath")
                .chain(labels.iter().map(String::as_str))
                .collect::<Vec<_>>();
            let data = std::iter::once(kpath.view())
                .chain(columns.iter().map(|c| c.view()))
                .collect::<Vec<_>>();
            write_columns_to_txt(txtout, &header, &data)?;
        }

        Ok(())
    }
}
