//! Input decks of pw.x: namelist groups followed by card sections.

use std::{
    fmt,
    fs,
    io::Write,
    path::Path,
};

use indexmap::IndexMap;
use log::{
    debug,
    info,
};

use crate::{
    error::{
        QeError,
        Result,
        SchemaItem,
    },
    qe_parsers::{
        namelist::{
            RecordParser,
            split_assignments,
        },
        schema::{
            FortranValue,
            Schema,
            normalize_group,
            parse_real,
            unquote,
        },
    },
};


pub type NamelistGroup = IndexMap<String, String>;


/// A card section. `options` is the inline tag after the card name, without braces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Card {
    pub options: Option<String>,
    pub body:    Vec<Vec<String>>,
}


#[derive(Debug, Clone, PartialEq)]
pub struct AtomPosition {
    pub symbol:   String,
    pub position: [f64; 3],
}


/// One vertex of a band structure path in the K_POINTS card.
#[derive(Debug, Clone, PartialEq)]
pub struct HighSymmetryPoint {
    pub label:    String,
    pub coord:    [f64; 3],
    /// Number of points of the segment starting at this vertex.
    pub npoints:  usize,
}


#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputDeck {
    namelists: IndexMap<String, NamelistGroup>,
    cards:     IndexMap<String, Card>,
}


impl InputDeck {
    /// Build a deck from already split parts, validated against `schema`.
    pub fn new(namelists: IndexMap<String, NamelistGroup>,
               cards: IndexMap<String, Card>,
               schema: &Schema) -> Result<Self> {
        let namelists = namelists.into_iter()
            .map(|(k, v)| (normalize_group(&k), v))
            .collect();
        let cards = cards.into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();
        let deck = Self { namelists, cards };
        deck.validate(schema)?;
        Ok(deck)
    }

    pub fn from_file(path: &(impl AsRef<Path> + ?Sized), schema: &Schema) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QeError::FileNotFound { path: path.to_path_buf() });
        }
        info!("Reading input deck {:?}", path);
        Self::parse(&fs::read_to_string(path)?, schema)
    }

    pub fn parse(txt: &str, schema: &Schema) -> Result<Self> {
        let parsed = RecordParser::default().parse_str(txt);

        let mut namelists = IndexMap::<String, NamelistGroup>::new();
        for (name, blocks) in parsed.records {
            let group = namelists.entry(normalize_group(&name)).or_insert_with(NamelistGroup::new);
            for line in blocks.iter().flatten() {
                for (key, value) in split_assignments(line) {
                    group.insert(key, value);
                }
            }
        }

        let cards = Self::parse_cards(&parsed.residual, schema)?;
        debug!("Deck has {} namelist groups and {} cards", namelists.len(), cards.len());

        let deck = Self { namelists, cards };
        deck.validate(schema)?;
        Ok(deck)
    }

    /// A line whose first token (braces stripped) is a known card name opens a card, the rest
    /// of the header are the options. Following non-blank lines are whitespace tokenized rows.
    ///
    /// Matching the whole token keeps `ADDITIONAL_K_POINTS` apart from `K_POINTS`. An unknown
    /// name after a known card cannot be told from a body row and is kept as one.
    fn parse_cards(lines: &[String], schema: &Schema) -> Result<IndexMap<String, Card>> {
        let mut cards = IndexMap::<String, Card>::new();
        let mut current: Option<String> = None;

        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('!') || trimmed.starts_with('#') {
                continue;
            }

            let mut tokens = trimmed.split_whitespace();
            let first = tokens.next().unwrap_or_default();
            let (head, tail) = first.split_once(|c: char| c == '{' || c == '(').unwrap_or((first, ""));
            let head = head.to_ascii_uppercase();

            if schema.has_card(&head) {
                let options = std::iter::once(tail)
                    .chain(tokens)
                    .collect::<Vec<_>>()
                    .join(" ")
                    .replace(|c: char| matches!(c, '{' | '}' | '(' | ')'), " ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                let options = if options.is_empty() { None } else { Some(options) };
                cards.insert(head.clone(), Card { options, body: vec![] });
                current = Some(head);
                continue;
            }

            match current.as_ref().and_then(|c| cards.get_mut(c)) {
                Some(card) => card.body.push(trimmed.split_whitespace().map(str::to_string).collect()),
                None => return Err(QeError::SchemaViolation { kind: SchemaItem::Card, name: head }),
            }
        }

        Ok(cards)
    }

    /// Every group and card must be known, every declared parameter must convert to its type.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for (group, params) in self.namelists.iter() {
            schema.check_namelist(&group.to_ascii_uppercase())?;
            for (key, value) in params.iter() {
                schema.convert(group, key, value)?;
            }
        }
        for name in self.cards.keys() {
            schema.check_card(name)?;
        }
        Ok(())
    }

    pub fn namelists(&self) -> &IndexMap<String, NamelistGroup> {
        &self.namelists
    }

    pub fn namelist(&self, group: &str) -> Option<&NamelistGroup> {
        self.namelists.get(&normalize_group(group))
    }

    pub fn cards(&self) -> &IndexMap<String, Card> {
        &self.cards
    }

    pub fn card(&self, name: &str) -> Option<&Card> {
        self.cards.get(&name.to_ascii_uppercase())
    }

    /// Raw value of `group.param`, parameter names compare case-insensitively.
    pub fn get_raw(&self, group: &str, param: &str) -> Option<&str> {
        self.namelist(group)?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(param))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_value(&self, group: &str, param: &str, schema: &Schema) -> Result<Option<FortranValue>> {
        self.get_raw(group, param)
            .map(|raw| schema.convert(group, param, raw))
            .transpose()
    }

    /// `calculation` of &CONTROL, `scf` when absent.
    pub fn calculation(&self) -> String {
        self.get_raw("CONTROL", "calculation")
            .map(|s| unquote(s).to_ascii_lowercase())
            .unwrap_or_else(|| "scf".to_string())
    }

    pub fn atom_positions(&self) -> Result<Vec<AtomPosition>> {
        let card = self.card("ATOMIC_POSITIONS")
            .ok_or_else(|| QeError::InvalidState("ATOMIC_POSITIONS card is absent".to_string()))?;

        card.body.iter()
            .map(|row| {
                if row.len() < 4 {
                    return Err(QeError::unrecognized(&row.join(" ")));
                }
                let mut position = [0.0f64; 3];
                for (x, tok) in position.iter_mut().zip(row[1 ..= 3].iter()) {
                    *x = parse_real(tok).ok_or_else(|| QeError::unrecognized(&row.join(" ")))?;
                }
                Ok(AtomPosition { symbol: row[0].clone(), position })
            })
            .collect()
    }

    /// Vertices of the band path, only meaningful for `calculation = 'bands'`.
    pub fn high_symmetry_kpoints(&self) -> Result<Vec<HighSymmetryPoint>> {
        let calculation = self.calculation();
        if calculation != "bands" {
            return Err(QeError::InvalidState(
                format!("high symmetry k-points need calculation = 'bands', got '{}'", calculation)));
        }
        let card = self.card("K_POINTS")
            .ok_or_else(|| QeError::InvalidState("K_POINTS card is absent".to_string()))?;

        let nks = card.body.first()
            .and_then(|row| row.first())
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| QeError::unrecognized(&card.body.first().map(|r| r.join(" ")).unwrap_or_default()))?;

        if card.body.len() < nks + 1 {
            return Err(QeError::InvalidState(
                format!("K_POINTS declares {} points but lists {}", nks, card.body.len() - 1)));
        }

        card.body[1 ..= nks].iter()
            .map(|row| {
                let line = row.join(" ");
                if row.len() < 4 {
                    return Err(QeError::unrecognized(&line));
                }
                let mut coord = [0.0f64; 3];
                for (x, tok) in coord.iter_mut().zip(row[.. 3].iter()) {
                    *x = parse_real(tok).ok_or_else(|| QeError::unrecognized(&line))?;
                }
                let npoints = parse_real(&row[3])
                    .map(|w| w.round() as usize)
                    .ok_or_else(|| QeError::unrecognized(&line))?;
                let label = row[4 ..].join(" ")
                    .trim_start_matches('!')
                    .trim()
                    .to_string();
                Ok(HighSymmetryPoint { label, coord, npoints })
            })
            .collect()
    }

    pub fn write_to_file(&self, path: &(impl AsRef<Path> + ?Sized)) -> Result<()> {
        let mut f = fs::File::create(path)?;
        write!(f, "{}", self)?;
        Ok(())
    }
}


impl fmt::Display for InputDeck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (group, params) in self.namelists.iter() {
            writeln!(f, "&{}", group)?;
            for (key, value) in params.iter() {
                writeln!(f, "    {} = {}", key, value)?;
            }
            writeln!(f, "/")?;
        }

        for (name, card) in self.cards.iter() {
            match card.options.as_ref() {
                Some(opt) => writeln!(f, "{} {{{}}}", name, opt)?,
                None      => writeln!(f, "{}", name)?,
            }
            for row in card.body.iter() {
                writeln!(f, "    {}", row.join(" "))?;
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const SCF: &str = r#"
 &control
    calculation = 'scf'
    prefix = 'si', outdir = './tmp/'
    pseudo_dir = './pseudo'
 /
 &system
    ibrav = 2, celldm(1) = 10.2, nat = 2, ntyp = 1
    ecutwfc = 3.0d1
    occupations = 'smearing', degauss = 0.01
 /
 &electrons
    conv_thr = 1.0d-8
 /
ATOMIC_SPECIES
 Si  28.086  Si.pz-vbc.UPF
ATOMIC_POSITIONS {alat}
 Si 0.00 0.00 0.00
 Si 0.25 0.25 0.25

K_POINTS automatic
 4 4 4 1 1 1
"#;

    const BANDS: &str = r#"
&CONTROL
  calculation = 'bands'
/
&SYSTEM
  ibrav = 2, celldm(1) = 10.2, nat = 2, ntyp = 1, ecutwfc = 30
/
&ELECTRONS
/
ATOMIC_SPECIES
 Si  28.086  Si.pz-vbc.UPF
ATOMIC_POSITIONS crystal
 Si 0.00 0.00 0.00
 Si 0.25 0.25 0.25
K_POINTS {crystal_b}
3
 0.0 0.0 0.0 20 !G
 0.5 0.0 0.5 10 ! X
 0.5 0.5 0.5 1
"#;

    fn schema() -> &'static Schema {
        Schema::builtin().unwrap()
    }

    #[test]
    fn test_parse_scf_deck() {
        let deck = InputDeck::parse(SCF, schema()).unwrap();
        assert_eq!(deck.namelists().keys().collect::<Vec<_>>(), vec!["CONTROL", "SYSTEM", "ELECTRONS"]);
        assert_eq!(deck.get_raw("control", "PREFIX"), Some("'si'"));
        assert_eq!(deck.get_raw("SYSTEM", "celldm(1)"), Some("10.2"));
        assert_eq!(deck.get_value("SYSTEM", "ecutwfc", schema()).unwrap(), Some(FortranValue::Real(30.0)));
        assert_eq!(deck.get_value("SYSTEM", "nat", schema()).unwrap(), Some(FortranValue::Integer(2)));
        assert_eq!(deck.get_value("SYSTEM", "nbnd", schema()).unwrap(), None);
        assert_eq!(deck.calculation(), "scf");

        assert_eq!(deck.cards().keys().collect::<Vec<_>>(),
                   vec!["ATOMIC_SPECIES", "ATOMIC_POSITIONS", "K_POINTS"]);
        assert_eq!(deck.card("atomic_positions").unwrap().options.as_deref(), Some("alat"));
        assert_eq!(deck.card("K_POINTS").unwrap().options.as_deref(), Some("automatic"));
        assert_eq!(deck.card("K_POINTS").unwrap().body, vec![vec!["4", "4", "4", "1", "1", "1"]]);
        assert_eq!(deck.card("ATOMIC_SPECIES").unwrap().options, None);

        let pos = deck.atom_positions().unwrap();
        assert_eq!(pos, vec![
            AtomPosition { symbol: "Si".into(), position: [0.0, 0.0, 0.0] },
            AtomPosition { symbol: "Si".into(), position: [0.25, 0.25, 0.25] },
        ]);

        assert!(matches!(deck.high_symmetry_kpoints(), Err(QeError::InvalidState(_))));
    }

    #[test]
    fn test_high_symmetry_kpoints() {
        let deck = InputDeck::parse(BANDS, schema()).unwrap();
        assert_eq!(deck.calculation(), "bands");
        let kpts = deck.high_symmetry_kpoints().unwrap();
        assert_eq!(kpts.len(), 3);
        assert_eq!(kpts[0], HighSymmetryPoint { label: "G".into(), coord: [0.0, 0.0, 0.0], npoints: 20 });
        assert_eq!(kpts[1].label, "X");
        assert_eq!(kpts[1].coord, [0.5, 0.0, 0.5]);
        assert_eq!(kpts[2].label, "");
        assert_eq!(kpts[2].npoints, 1);
    }

    #[test]
    fn test_unknown_namelist_fails() {
        let txt = "&control\n calculation = 'scf'\n/\n&foo\n x = 1\n/\n";
        match InputDeck::parse(txt, schema()) {
            Err(QeError::SchemaViolation { kind: SchemaItem::Namelist, name }) => assert_eq!(name, "FOO"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_card_fails() {
        let txt = "&control\n/\nNOT_A_CARD\n 1 2 3\n";
        match InputDeck::parse(txt, schema()) {
            Err(QeError::SchemaViolation { kind: SchemaItem::Card, name }) => assert_eq!(name, "NOT_A_CARD"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_card_names_match_whole_token() {
        let txt = "&control\n/\nK_POINTS automatic\n 4 4 4 0 0 0\nADDITIONAL_K_POINTS tpiba_b\n 2\n";
        let deck = InputDeck::parse(txt, schema()).unwrap();
        assert_eq!(deck.cards().keys().collect::<Vec<_>>(), vec!["K_POINTS", "ADDITIONAL_K_POINTS"]);
        assert_eq!(deck.card("K_POINTS").unwrap().body, vec![vec!["4", "4", "4", "0", "0", "0"]]);
        assert_eq!(deck.card("ADDITIONAL_K_POINTS").unwrap().options.as_deref(), Some("tpiba_b"));

        // taken as a body row of the card before it
        let txt = "&control\n/\nK_POINTS gamma\nNOT_A_CARD\n";
        let deck = InputDeck::parse(txt, schema()).unwrap();
        assert_eq!(deck.card("K_POINTS").unwrap().body, vec![vec!["NOT_A_CARD"]]);
    }

    #[test]
    fn test_type_mismatch_fails() {
        let txt = "&system\n nat = 2.5\n/\n";
        match InputDeck::parse(txt, schema()) {
            Err(QeError::TypeMismatch { param, value, expected }) => {
                assert_eq!(param, "nat");
                assert_eq!(value, "2.5");
                assert_eq!(expected, "INTEGER");
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let deck = InputDeck::parse(SCF, schema()).unwrap();
        let txt = deck.to_string();
        assert!(txt.starts_with("&CONTROL\n    calculation = 'scf'\n"));
        assert!(txt.contains("ATOMIC_POSITIONS {alat}\n    Si 0.00 0.00 0.00\n"));

        let again = InputDeck::parse(&txt, schema()).unwrap();
        assert_eq!(deck, again);
    }

    #[test]
    fn test_new_validates() {
        let mut group = NamelistGroup::new();
        group.insert("ecutwfc".into(), "abc".into());
        let mut namelists = IndexMap::new();
        namelists.insert("&system".to_string(), group);
        assert!(matches!(InputDeck::new(namelists, IndexMap::new(), schema()),
                         Err(QeError::TypeMismatch { .. })));

        let mut cards = IndexMap::new();
        cards.insert("k_points".to_string(), Card { options: Some("gamma".into()), body: vec![] });
        let deck = InputDeck::new(IndexMap::new(), cards, schema()).unwrap();
        assert!(deck.card("K_POINTS").is_some());
    }
}
