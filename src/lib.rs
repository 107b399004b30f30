/// Compile a literal pattern once and hand out a `&'static Regex`.
macro_rules! regex {
    ($re: literal) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

pub mod types;
pub mod error;
pub mod qe_parsers;
pub mod contribution;
pub mod format;
pub mod commands;
pub mod cli;

pub use cli::OptProcess;

pub use error::{
    QeError,
    Result,
    SchemaItem,
};

pub use qe_parsers::namelist::{
    RecordParser,
    ParsedRecords,
};

pub use qe_parsers::schema::{
    Schema,
    FortranType,
    FortranValue,
};

pub use qe_parsers::pwin::{
    InputDeck,
    Card,
    AtomPosition,
    HighSymmetryPoint,
};

pub use qe_parsers::projwfc::{
    ProjwfcOut,
    ProblemSize,
    AtomicState,
    AngularMomentum,
    Projections,
};

pub use qe_parsers::projwfc_in::ProjwfcInput;

pub use qe_parsers::pdos::{
    PdosFile,
    OrbitalLabel,
};

pub use qe_parsers::filband::Filband;
pub use qe_parsers::pwout::PwOut;

pub use contribution::{
    ContributionRanker,
    ContributionType,
    Contribution,
};

pub use format::{
    AtomicStatesFormat,
    ProjectionsFormat,
    ContributionsFormat,
};
