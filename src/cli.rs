use clap::{
    Parser,
    builder::styling::{
        AnsiColor,
        Effects,
        Styles,
    },
};
use enum_dispatch::enum_dispatch;
use anyhow::Result;

use crate::commands::{
    states::States,
    proj::Proj,
    sortorbs::Sortorbs,
    deck::Deck,
    band::Band,
};


/// Help colours: section headers in yellow, flags and usage in green.
pub fn get_style() -> Styles {
    let bold_green = AnsiColor::Green.on_default() | Effects::BOLD;
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD | Effects::UNDERLINE)
        .usage(bold_green)
        .literal(bold_green)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::BrightGreen.on_default())
        .invalid(AnsiColor::BrightYellow.on_default())
}


#[enum_dispatch]
pub trait OptProcess {
    fn process(&self) -> Result<()>;
}


#[enum_dispatch(OptProcess)]
#[derive(Debug, Parser)]
#[command(name = "qeutils",
          about = r"Inspect the input and output files of Quantum ESPRESSO pw.x, projwfc.x and bands.x.",
          version,
          styles = get_style()
          )]
enum Opt {
    States,

    Proj,

    Sortorbs,

    Deck,

    Band,
}


pub fn run() -> Result<()> {
    Opt::parse().process()
}
