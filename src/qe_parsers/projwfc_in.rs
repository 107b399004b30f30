//! Input of projwfc.x, either as its native `&PROJWFC` namelist or as a flat TOML table.

use std::{
    fs,
    path::Path,
};

use serde::{
    Deserialize,
    Serialize,
};
use figment::{
    Figment,
    providers::{
        Format,
        Toml,
    },
};
use log::info;

use crate::{
    error::{
        QeError,
        Result,
    },
    qe_parsers::{
        namelist::{
            RecordParser,
            split_assignments,
        },
        schema::{
            normalize_group,
            parse_logical,
            parse_real,
            unquote,
        },
    },
};


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjwfcInput {
    pub prefix:          String,
    pub outdir:          String,
    pub ngauss:          i64,
    /// Gaussian broadening in Ry.
    pub degauss:         f64,
    pub emin:            Option<f64>,
    pub emax:            Option<f64>,
    #[serde(rename = "deltae", alias = "delta_e")]
    pub delta_e:         f64,
    pub lsym:            bool,
    pub pawproj:         bool,
    pub filpdos:         Option<String>,
    pub filproj:         Option<String>,
    pub lwrite_overlaps: bool,
    pub lbinary_data:    bool,
    pub kresolveddos:    bool,
    pub tdosinboxes:     bool,
    pub n_proj_boxes:    i64,
}


impl Default for ProjwfcInput {
    fn default() -> Self {
        Self {
            prefix:          "pwscf".to_string(),
            outdir:          "./".to_string(),
            ngauss:          0,
            degauss:         0.0,
            emin:            None,
            emax:            None,
            delta_e:         0.01,
            lsym:            true,
            pawproj:         false,
            filpdos:         None,
            filproj:         None,
            lwrite_overlaps: false,
            lbinary_data:    false,
            kresolveddos:    false,
            tdosinboxes:     false,
            n_proj_boxes:    1,
        }
    }
}


impl ProjwfcInput {
    /// Load a flat TOML table, keys absent from the file take their projwfc.x defaults.
    pub fn from_toml_file(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QeError::FileNotFound { path: path.to_path_buf() });
        }
        info!("Reading projwfc.x settings {:?}", path);
        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| QeError::Config(Box::new(e)))
    }

    pub fn from_toml_str(txt: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(txt))
            .extract()
            .map_err(|e| QeError::Config(Box::new(e)))
    }

    pub fn from_namelist_file(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QeError::FileNotFound { path: path.to_path_buf() });
        }
        info!("Reading projwfc.x input {:?}", path);
        Self::from_namelist(&fs::read_to_string(path)?)
    }

    /// Read the `&PROJWFC` record of a projwfc.x input file.
    pub fn from_namelist(txt: &str) -> Result<Self> {
        let parsed = RecordParser::default().parse_str(txt);
        let mut table = toml::value::Table::new();

        for (name, blocks) in parsed.records.iter() {
            if normalize_group(name) != "PROJWFC" {
                continue;
            }
            for line in blocks.iter().flatten() {
                for (key, value) in split_assignments(line) {
                    table.insert(key.to_ascii_lowercase(), fortran_to_toml(&value));
                }
            }
        }

        if table.is_empty() && !parsed.records.keys().any(|k| normalize_group(k) == "PROJWFC") {
            return Err(QeError::InvalidState("no &PROJWFC namelist found".to_string()));
        }

        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Base name of the pdos files, `prefix` unless `filpdos` is set.
    pub fn filpdos(&self) -> &str {
        self.filpdos.as_deref().unwrap_or(&self.prefix)
    }

    /// Whether `filproj` is the `filband` of bands.x with a `.proj` suffix.
    pub fn check_file_compat_with_bandsx(&self, filband: &str) -> bool {
        self.filproj.as_ref()
            .map(|f| f.replace(".proj", "") == filband)
            .unwrap_or(false)
    }
}


/// Infer the TOML type of a raw namelist value: quoted strings stay strings, then logical,
/// integer and real literals are tried in turn.
fn fortran_to_toml(raw: &str) -> toml::Value {
    let raw = raw.trim();
    let unquoted = unquote(raw);
    if unquoted.len() != raw.len() {
        return toml::Value::String(unquoted.to_string());
    }

    if raw.starts_with('.') || raw.eq_ignore_ascii_case("t") || raw.eq_ignore_ascii_case("f") {
        if let Some(b) = parse_logical(raw) {
            return toml::Value::Boolean(b);
        }
    }
    if let Ok(i) = raw.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    if let Some(x) = parse_real(raw) {
        return toml::Value::Float(x);
    }
    toml::Value::String(raw.to_string())
}
