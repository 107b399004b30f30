//! Reference schema of namelist groups, their parameters and the known card names.
//!
//! The schema is an immutable value. Load it once and hand a reference to every consumer,
//! `Schema::builtin()` gives the copy bundled with the crate.

use std::{
    fmt,
    fs,
    path::Path,
    sync::OnceLock,
};

use indexmap::IndexMap;
use serde::Deserialize;
use log::debug;

use crate::{
    error::{
        QeError,
        Result,
        SchemaItem,
    },
    qe_parsers::namelist::split_top_level,
};


const BUILTIN_SCHEMA: &str = include_str!("../../data/pw_schema.toml");


/// Fortran type tag of a namelist parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FortranType {
    Character,
    Logical,
    Integer,
    Real,
}


#[derive(Debug, Clone, PartialEq)]
pub enum FortranValue {
    Character(String),
    Logical(bool),
    Integer(i64),
    Real(f64),
    /// Comma separated values, e.g. `starting_magnetization = 0.5, -0.5`.
    List(Vec<FortranValue>),
}


impl fmt::Display for FortranType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Character => "CHARACTER",
            Self::Logical   => "LOGICAL",
            Self::Integer   => "INTEGER",
            Self::Real      => "REAL",
        };
        f.write_str(s)
    }
}


impl FortranType {
    /// Convert a raw namelist value. `param` only serves the error message.
    ///
    /// A value holding several comma separated items converts item by item into a `List`.
    pub fn convert(&self, param: &str, raw: &str) -> Result<FortranValue> {
        let items = split_top_level(raw, ',');
        if items.len() > 1 {
            return items.into_iter()
                .map(|item| self.convert_scalar(param, item))
                .collect::<Result<Vec<_>>>()
                .map(FortranValue::List);
        }
        self.convert_scalar(param, raw)
    }

    fn convert_scalar(&self, param: &str, raw: &str) -> Result<FortranValue> {
        let raw = raw.trim();
        let mismatch = || QeError::TypeMismatch {
            param:    param.to_string(),
            value:    raw.to_string(),
            expected: self.to_string(),
        };

        match self {
            Self::Character => Ok(FortranValue::Character(unquote(raw).to_string())),
            Self::Logical   => parse_logical(raw).map(FortranValue::Logical).ok_or_else(mismatch),
            Self::Integer   => raw.parse::<i64>().map(FortranValue::Integer).map_err(|_| mismatch()),
            Self::Real      => parse_real(raw).map(FortranValue::Real).ok_or_else(mismatch),
        }
    }
}


/// Strip one level of matching single or double quotes.
pub fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1 .. s.len() - 1];
        }
    }
    s
}


/// Fortran logical literal: optional leading `.`, then `T`/`F` (case insensitive), e.g.
/// `.true.`, `.F.`, `T`, `false`.
pub fn parse_logical(s: &str) -> Option<bool> {
    let s = s.trim().trim_start_matches('.');
    match s.chars().next()?.to_ascii_lowercase() {
        't' => Some(true),
        'f' => Some(false),
        _ => None,
    }
}


/// Fortran real literal, the `d`/`D` exponent marker is replaced with `e` first.
pub fn parse_real(s: &str) -> Option<f64> {
    s.trim().replace(['d', 'D'], "e").parse::<f64>().ok()
}


#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub ty:      FortranType,
    pub default: Option<String>,
    pub status:  Option<String>,
}


#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardSpec {
    #[serde(default)]
    pub options: Vec<String>,
}


#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    namelists: IndexMap<String, IndexMap<String, ParamSpec>>,
    cards:     IndexMap<String, CardSpec>,
}


impl Schema {
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let raw: Schema = toml::from_str(txt)?;

        // Keys are matched case-insensitively, store them upper/lower cased once.
        let namelists = raw.namelists.into_iter()
            .map(|(group, params)| {
                let params = params.into_iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v))
                    .collect();
                (normalize_group(&group), params)
            })
            .collect::<IndexMap<_, _>>();
        let cards = raw.cards.into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect::<IndexMap<_, _>>();

        debug!("Schema loaded with {} namelists and {} cards", namelists.len(), cards.len());
        Ok(Self { namelists, cards })
    }

    pub fn from_file(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QeError::FileNotFound { path: path.to_path_buf() });
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// The schema bundled with the crate, parsed on first use.
    pub fn builtin() -> Result<&'static Schema> {
        static INSTANCE: OnceLock<Schema> = OnceLock::new();
        if let Some(schema) = INSTANCE.get() {
            return Ok(schema);
        }
        let schema = Self::from_toml_str(BUILTIN_SCHEMA)?;
        Ok(INSTANCE.get_or_init(|| schema))
    }

    pub fn has_namelist(&self, group: &str) -> bool {
        self.namelists.contains_key(&normalize_group(group))
    }

    pub fn has_card(&self, card: &str) -> bool {
        self.cards.contains_key(&card.to_ascii_uppercase())
    }

    pub fn namelist_names(&self) -> impl Iterator<Item = &str> {
        self.namelists.keys().map(String::as_str)
    }

    pub fn card_names(&self) -> impl Iterator<Item = &str> {
        self.cards.keys().map(String::as_str)
    }

    pub fn card(&self, card: &str) -> Option<&CardSpec> {
        self.cards.get(&card.to_ascii_uppercase())
    }

    /// Look up a parameter, array elements such as `celldm(1)` resolve to `celldm`.
    pub fn param(&self, group: &str, param: &str) -> Option<&ParamSpec> {
        let base = param.split('(').next().unwrap_or(param).trim().to_ascii_lowercase();
        self.namelists.get(&normalize_group(group))?.get(&base)
    }

    pub fn check_namelist(&self, group: &str) -> Result<()> {
        if self.has_namelist(group) {
            Ok(())
        } else {
            Err(QeError::SchemaViolation { kind: SchemaItem::Namelist, name: group.to_string() })
        }
    }

    pub fn check_card(&self, card: &str) -> Result<()> {
        if self.has_card(card) {
            Ok(())
        } else {
            Err(QeError::SchemaViolation { kind: SchemaItem::Card, name: card.to_string() })
        }
    }

    /// Convert `raw` to the declared type of `group.param`. Parameters the schema does not
    /// declare are passed through as `Character`.
    pub fn convert(&self, group: &str, param: &str, raw: &str) -> Result<FortranValue> {
        match self.param(group, param) {
            Some(spec) => spec.ty.convert(param, raw),
            None => Ok(FortranValue::Character(unquote(raw).to_string())),
        }
    }
}


/// `&control` -> `CONTROL`
pub fn normalize_group(group: &str) -> String {
    group.trim().trim_start_matches('&').to_ascii_uppercase()
}
