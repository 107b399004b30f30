use std::path::PathBuf;

use tempdir::TempDir;
use qeutils::{
    Result,
    QeError,
    SchemaItem,
    Schema,
    InputDeck,
    FortranValue,
};


macro_rules! get_fpath_in_current_dir {
    ($fname:expr) => {{
        let mut path = PathBuf::from(file!());
        path.pop();
        path.push($fname);
        path
    }}
}


#[test]
fn test_read_scf_deck() -> Result<()> {
    let schema = Schema::builtin()?;
    let deck = InputDeck::from_file(&get_fpath_in_current_dir!("scf.in"), schema)?;

    assert_eq!(deck.namelists().keys().collect::<Vec<_>>(), vec!["CONTROL", "SYSTEM", "ELECTRONS"]);
    assert_eq!(deck.cards().keys().collect::<Vec<_>>(), vec!["ATOMIC_SPECIES", "ATOMIC_POSITIONS", "K_POINTS"]);
    assert_eq!(deck.calculation(), "scf");

    assert_eq!(deck.get_value("system", "nat", schema)?, Some(FortranValue::Integer(2)));
    assert_eq!(deck.get_value("SYSTEM", "celldm(1)", schema)?, Some(FortranValue::Real(10.2)));
    assert_eq!(deck.get_value("ELECTRONS", "conv_thr", schema)?, Some(FortranValue::Real(1.0e-8)));
    assert_eq!(deck.get_value("CONTROL", "prefix", schema)?, Some(FortranValue::Character("si".to_string())));
    assert_eq!(deck.get_value("CONTROL", "tstress", schema)?, None);

    let positions = deck.atom_positions()?;
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[1].symbol, "Si");
    assert_eq!(positions[1].position, [0.25, 0.25, 0.25]);

    assert_eq!(deck.card("ATOMIC_POSITIONS").unwrap().options.as_deref(), Some("alat"));
    assert_eq!(deck.card("K_POINTS").unwrap().body, vec![vec!["8", "8", "8", "0", "0", "0"]]);

    assert!(matches!(deck.high_symmetry_kpoints(), Err(QeError::InvalidState(_))));
    Ok(())
}


#[test]
fn test_read_bands_deck() -> Result<()> {
    let schema = Schema::builtin()?;
    let deck = InputDeck::from_file(&get_fpath_in_current_dir!("bands.in"), schema)?;

    assert_eq!(deck.calculation(), "bands");
    assert!(deck.namelist("ELECTRONS").unwrap().is_empty());
    assert_eq!(deck.card("ATOMIC_POSITIONS").unwrap().options.as_deref(), Some("crystal"));

    let path = deck.high_symmetry_kpoints()?;
    let labels = path.iter().map(|p| p.label.as_str()).collect::<Vec<_>>();
    assert_eq!(labels, vec!["L", "G", "X", "U"]);
    assert_eq!(path[1].coord, [0.0, 0.0, 0.0]);
    assert_eq!(path[2].npoints, 10);
    Ok(())
}


#[test]
fn test_type_mismatch() {
    let schema = Schema::builtin().unwrap();
    let err = InputDeck::from_file(&get_fpath_in_current_dir!("broken.in"), schema).unwrap_err();
    match err {
        QeError::TypeMismatch { param, value, .. } => {
            assert_eq!(param, "nat");
            assert_eq!(value, "two");
        },
        e => panic!("unexpected error {:?}", e),
    }
}


#[test]
fn test_unknown_items() {
    let schema = Schema::builtin().unwrap();
    let txt = "&CONTROL\n/\n&FOO\n x = 1\n/\n";
    assert!(matches!(InputDeck::parse(txt, schema),
                     Err(QeError::SchemaViolation { kind: SchemaItem::Namelist, .. })));

    let txt = "&CONTROL\n/\nNOT_A_CARD\n 1 2 3\n";
    assert!(matches!(InputDeck::parse(txt, schema),
                     Err(QeError::SchemaViolation { kind: SchemaItem::Card, .. })));
}


#[test]
fn test_write_and_read_back() -> Result<()> {
    let schema = Schema::builtin()?;
    let deck = InputDeck::from_file(&get_fpath_in_current_dir!("scf.in"), schema)?;

    let dir = TempDir::new("test_write_deck")?;
    let fname = dir.path().join("scf.in");
    deck.write_to_file(&fname)?;

    let again = InputDeck::from_file(&fname, schema)?;
    assert_eq!(deck, again);
    Ok(())
}


#[test]
fn test_list_valued_parameter() -> Result<()> {
    let schema = Schema::builtin()?;
    let txt = "&CONTROL\n calculation='scf'\n/\n\
               &SYSTEM\n ibrav = 0, nat = 2, ntyp = 2, ecutwfc = 30\n starting_magnetization = 0.5, -0.5\n/\n";
    let deck = InputDeck::parse(txt, schema)?;
    let expected = Some(FortranValue::List(vec![FortranValue::Real(0.5), FortranValue::Real(-0.5)]));
    assert_eq!(deck.get_raw("SYSTEM", "starting_magnetization"), Some("0.5, -0.5"));
    assert_eq!(deck.get_value("SYSTEM", "starting_magnetization", schema)?, expected);
    assert_eq!(deck.get_value("SYSTEM", "ecutwfc", schema)?, Some(FortranValue::Real(30.0)));

    let dir = TempDir::new("test_list_value")?;
    let fname = dir.path().join("magnetic.in");
    deck.write_to_file(&fname)?;

    let again = InputDeck::from_file(&fname, schema)?;
    assert_eq!(again.get_value("SYSTEM", "starting_magnetization", schema)?, expected);
    assert_eq!(deck, again);
    Ok(())
}


#[test]
fn test_custom_schema() -> Result<()> {
    let schema = Schema::from_toml_str(r#"
[namelists.CONTROL]
calculation = { type = "CHARACTER", default = "scf" }

[cards.K_POINTS]
options = ["automatic", "gamma"]
"#)?;
    let deck = InputDeck::parse("&control\n calculation = 'nscf'\n/\nK_POINTS gamma\n", &schema)?;
    assert_eq!(deck.calculation(), "nscf");
    assert_eq!(deck.card("K_POINTS").unwrap().options.as_deref(), Some("gamma"));

    assert!(InputDeck::from_file(&get_fpath_in_current_dir!("scf.in"), &schema).is_err());
    Ok(())
}
