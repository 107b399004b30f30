use std::path::PathBuf;

use clap::Args;
use log::{
    info,
    warn,
};
use anyhow::{
    Context,
    Result,
};

use crate::{
    OptProcess,
    ProjwfcOut,
    ProjectionsFormat,
    types::parse_selection,
    commands::common::resolve_fermi,
};


#[derive(Debug, Args)]
/// Print the projections of Kohn-Sham states onto atomic states.
///
/// For every selected k-point and band the selected atomic states are sorted by weight.
/// Indices count from 1; ranges like "2..5" and negative indices like "-1" are accepted.
pub struct Proj {
    #[arg(default_value = "./projwfc.out")]
    /// Standard output of projwfc.x
    projwfc: PathBuf,

    #[arg(short = 'k', long)]
    /// Selected k-points, e.g. "1 3..5", all by default
    kpoints: Option<String>,

    #[arg(short = 'b', long)]
    /// Selected bands, all by default
    bands: Option<String>,

    #[arg(short = 'w', long)]
    /// Selected atomic states, all by default
    states: Option<String>,

    #[arg(short = 'n', long, default_value = "4")]
    /// Number of leading states printed per row, 0 prints all
    ntop: usize,

    #[arg(short = 't', long, default_value = "0.1")]
    /// Weights above this value are highlighted
    threshold: f64,

    #[arg(long)]
    /// Reference energy in eV
    fermi: Option<f64>,

    #[arg(long)]
    /// Read the reference energy from this pw.x output
    pwout: Option<PathBuf>,

    #[arg(long = "check-sum")]
    /// Report states whose projections sum outside of [0, 1]
    check_sum: bool,

    #[arg(long = "no-color")]
    /// Don't highlight large weights
    no_color: bool,
}


impl OptProcess for Proj {
    fn process(&self) -> Result<()> {
        let mut out = ProjwfcOut::from_file(&self.projwfc)?
            .with_fermi(resolve_fermi(self.fermi, self.pwout.as_deref())?);
        out.read_projections()
            .with_context(|| format!("[PROJ]: Reading projections from {:?} failed", &self.projwfc))?;

        let ks = parse_selection(self.kpoints.as_deref(), out.nk())?;
        let bs = parse_selection(self.bands.as_deref(), out.nbnd())?;
        let ws = parse_selection(self.states.as_deref(), out.natomwfc())?;
        info!("{} k-points, {} bands and {} states selected", ks.len(), bs.len(), ws.len());

        if self.check_sum {
            let bad = out.check_projection_sums(1e-3)?;
            if bad.is_empty() {
                info!("[PROJ]: All projection sums are inside [0, 1]");
            } else {
                warn!("[PROJ]: {} states have projection sums outside of [0, 1]", bad.len());
            }
        }

        let mut fmt = ProjectionsFormat::from_projwfc(&out, &ks, &bs, &ws)?;
        fmt.ntop(self.ntop)
            .threshold(self.threshold)
            .print_color(!self.no_color);
        print!("{}", fmt);
        Ok(())
    }
}
