pub mod namelist;
pub mod schema;
pub mod pwin;
pub mod projwfc;
pub mod projwfc_in;
pub mod pdos;
pub mod filband;
pub mod pwout;
