use std::path::PathBuf;

use clap::Args;
use log::info;
use anyhow::Result;
use colored::Colorize;

use crate::{
    OptProcess,
    commands::common::load_deck,
};


#[derive(Debug, Args)]
/// Validate a pw.x input deck against the reference schema and print it normalized.
pub struct Deck {
    #[arg(default_value = "./pw.in")]
    /// pw.x input deck
    pwin: PathBuf,

    #[arg(short = 's', long)]
    /// Reference schema in TOML, the bundled one by default
    schema: Option<PathBuf>,

    #[arg(short = 'o', long)]
    /// Write the normalized deck to this file instead of printing it
    output: Option<PathBuf>,

    #[arg(short = 'p', long = "positions")]
    /// Print atomic positions
    print_positions: bool,

    #[arg(short = 'k', long = "kpath")]
    /// Print the high symmetry k-points of a band structure run
    print_kpath: bool,
}


impl OptProcess for Deck {
    fn process(&self) -> Result<()> {
        let deck = load_deck(&self.pwin, self.schema.as_deref())?;
        info!("{:?} is valid, calculation = '{}'", &self.pwin, deck.calculation());

        match self.output.as_ref() {
            Some(out) => {
                deck.write_to_file(out)?;
                info!("Normalized deck written to {:?}", out);
            },
            None => print!("{}", deck),
        }

        if self.print_positions {
            println!("{}", "# atomic positions".bright_yellow());
            for (i, atom) in deck.atom_positions()?.iter().enumerate() {
                println!("{:5} {:>4} {:12.6} {:12.6} {:12.6}", i + 1, atom.symbol,
                         atom.position[0], atom.position[1], atom.position[2]);
            }
        }

        if self.print_kpath {
            println!("{}", "# high symmetry k-points".bright_yellow());
            for pt in deck.high_symmetry_kpoints()?.iter() {
                println!("{:>6} {:10.6} {:10.6} {:10.6} {:5}", pt.label,
                         pt.coord[0], pt.coord[1], pt.coord[2], pt.npoints);
            }
        }

        Ok(())
    }
}
