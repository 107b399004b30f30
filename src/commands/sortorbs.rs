use std::path::PathBuf;

use clap::Args;
use log::info;
use anyhow::{
    bail,
    Result,
};
use ndarray::Array1;

use crate::{
    OptProcess,
    ProjwfcOut,
    PdosFile,
    OrbitalLabel,
    ContributionRanker,
    ContributionType,
    ContributionsFormat,
    commands::common::{
        load_deck,
        resolve_fermi,
        write_columns_to_txt,
    },
};


#[derive(Debug, Args)]
/// Sort orbitals by their contribution to the states in an energy window.
///
/// By default the pdos files written by projwfc.x are ranked. With --by-projection the
/// atomic states of projwfc.x output are ranked from the projections instead.
pub struct Sortorbs {
    #[arg(default_value = "./projwfc.out")]
    /// Standard output of projwfc.x, only read with --by-projection
    projwfc: PathBuf,

    #[arg(short = 'd', long, default_value = "./")]
    /// Directory containing the `*.pdos_atm#*(*)_wfc#*(*)` files
    pdos_dir: PathBuf,

    #[arg(long, allow_hyphen_values = true)]
    /// Lower bound of the window, relative to the Fermi energy, in eV
    emin: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    /// Upper bound of the window, relative to the Fermi energy, in eV
    emax: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    /// Fermi energy in eV
    fermi: Option<f64>,

    #[arg(long)]
    /// Read the Fermi energy from this pw.x output
    pwout: Option<PathBuf>,

    #[arg(long)]
    /// pw.x input deck, labels orbitals with element and position
    pwin: Option<PathBuf>,

    #[arg(short = 'e', long, default_value = "max", value_parser = ["max", "integral"])]
    /// How the contribution is evaluated: peak value or integral over the window
    evaluation: String,

    #[arg(long = "by-projection")]
    /// Rank the atomic states of projwfc.x output instead of pdos files
    by_projection: bool,

    #[arg(long)]
    /// Write rank, orbital index and contribution to a text file
    txtout: Option<PathBuf>,
}


impl OptProcess for Sortorbs {
    fn process(&self) -> Result<()> {
        let fermi = resolve_fermi(self.fermi, self.pwout.as_deref())?;
        let rule = self.evaluation.parse::<ContributionType>()?;

        let mut ranker = ContributionRanker::new(rule).with_fermi(fermi);
        match (self.emin, self.emax) {
            (None, None) => {},
            (lo, hi) => {
                let lo = lo.unwrap_or(f64::NEG_INFINITY);
                let hi = hi.unwrap_or(f64::INFINITY);
                if lo > hi {
                    bail!("[SORTORBS]: emin ({}) is larger than emax ({})", lo, hi);
                }
                ranker = ranker.with_window(lo, hi);
            },
        }

        let (ranked, labels) = if self.by_projection {
            let mut out = ProjwfcOut::from_file(&self.projwfc)?.with_fermi(fermi);
            out.read_projections()?;
            let labels = out.states.iter()
                .enumerate()
                .map(|(i, st)| format!("#{}(atom {}, l={})", i + 1, st.iatom + 1, st.l))
                .collect::<Vec<_>>();
            (ranker.rank_projections(&out)?, labels)
        } else {
            let files = PdosFile::discover(&self.pdos_dir)?;
            if files.is_empty() {
                bail!("[SORTORBS]: No pdos file found in {:?}", &self.pdos_dir);
            }
            let deck = match self.pwin.as_deref() {
                Some(p) => Some(load_deck(p, None)?),
                None => None,
            };
            let labels = OrbitalLabel::build(&files, deck.as_ref())?
                .into_iter()
                .map(|l| l.label)
                .collect::<Vec<_>>();
            (ranker.rank_pdos_files(&files)?, labels)
        };
        info!("{} orbitals ranked", ranked.len());

        let rows = ranked.iter()
            .map(|c| (labels[c.index].clone(), c.value))
            .collect::<Vec<_>>();
        print!("{}", ContributionsFormat::from(rows));

        if let Some(txtout) = self.txtout.as_ref() {
            let rank  = (1 ..= ranked.len()).map(|i| i as f64).collect::<Array1<f64>>();
            let index = ranked.iter().map(|c| (c.index + 1) as f64).collect::<Array1<f64>>();
            let value = ranked.iter().map(|c| c.value).collect::<Array1<f64>>();
            write_columns_to_txt(txtout, &["rank", "orbital", "contribution"],
                                 &[rank.view(), index.view(), value.view()])?;
        }

        Ok(())
    }
}
