use std::path::PathBuf;

use clap::Args;
use log::info;
use anyhow::Result;

use crate::{
    OptProcess,
    ProjwfcOut,
    AtomicStatesFormat,
    commands::common::load_positions,
};


#[derive(Debug, Args)]
/// Print the atomic states used for projection by projwfc.x.
///
/// With a pw.x input deck the element and position of every owner atom are printed too.
pub struct States {
    #[arg(default_value = "./projwfc.out")]
    /// Standard output of projwfc.x
    projwfc: PathBuf,

    #[arg(long)]
    /// pw.x input deck of the same system
    pwin: Option<PathBuf>,

    #[arg(short = 'p', long = "position")]
    /// Print the positions of the owner atoms, needs --pwin
    print_position: bool,

    #[arg(short = 'n', long = "numeric-l")]
    /// Print l as a number instead of s, p, d and f
    numeric_l: bool,
}


impl OptProcess for States {
    fn process(&self) -> Result<()> {
        info!("Reading projwfc.x output {:?}", &self.projwfc);
        let out = ProjwfcOut::from_file(&self.projwfc)?;
        info!("natomwfc = {}, nbnd = {}, nkstot = {}, soc = {}",
              out.natomwfc(), out.nbnd(), out.size.nkstot, out.soc());

        let positions = load_positions(self.pwin.as_deref())?;

        let mut fmt = AtomicStatesFormat::from(out.states.clone());
        fmt.print_spdf(!self.numeric_l)
            .print_position(self.print_position && positions.is_some());
        if let Some(p) = positions {
            fmt.positions(p);
        }
        print!("{}", fmt);
        Ok(())
    }
}
