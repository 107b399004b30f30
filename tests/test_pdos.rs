use std::path::PathBuf;

use approx::assert_relative_eq;
use qeutils::{
    Result,
    QeError,
    Schema,
    InputDeck,
    PdosFile,
    OrbitalLabel,
    PwOut,
    ContributionRanker,
    ContributionType,
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
fn test_discover() -> Result<()> {
    let files = PdosFile::discover(&get_fpath_in_current_dir!("pdos"))?;
    let names = files.iter().map(|f| f.file_name()).collect::<Vec<_>>();
    assert_eq!(names, vec![
        "si.pdos_atm#1(Si)_wfc#1(s)",
        "si.pdos_atm#1(Si)_wfc#2(p)",
        "si.pdos_atm#2(Si)_wfc#1(s)",
        "si.pdos_atm#2(Si)_wfc#2(p)",
    ]);

    let data = files[1].load()?;
    assert_eq!(data.shape(), &[201, 5]);
    assert_eq!(data[[0, 0]], -10.0);
    assert_eq!(data[[170, 1]], 0.6);
    Ok(())
}


#[test]
fn test_labels() -> Result<()> {
    let files = PdosFile::discover(&get_fpath_in_current_dir!("pdos"))?;
    let deck = InputDeck::from_file(&get_fpath_in_current_dir!("scf.in"), Schema::builtin()?)?;

    let labels = OrbitalLabel::build(&files, Some(&deck))?;
    assert_eq!(labels[0].label, "Si_0.0_0.0_0.0_1(s)");
    assert_eq!(labels[3].label, "Si_0.25_0.25_0.25_2(p)");
    assert_eq!(labels[3].iatom, 2);

    let labels = OrbitalLabel::build(&files, None)?;
    assert_eq!(labels[2].label, "si.pdos_atm#2(Si)_wfc#1(s)");
    Ok(())
}


#[test]
fn test_sort_orbitals() -> Result<()> {
    let files = PdosFile::discover(&get_fpath_in_current_dir!("pdos"))?;
    let fermi = 5.0;

    let ranked = ContributionRanker::new(ContributionType::Max)
        .with_window(-2.0, 4.0)
        .with_fermi(fermi)
        .rank_pdos_files(&files)?;
    assert_eq!(ranked.iter().map(|c| c.index).collect::<Vec<_>>(), vec![3, 1, 2, 0]);
    assert_eq!(ranked[0].value, 1.2);
    assert_eq!(ranked[1].value, 0.6);

    let ranked = ContributionRanker::new(ContributionType::Integral)
        .with_window(-2.0, 4.0)
        .with_fermi(fermi)
        .rank_pdos_files(&files)?;
    assert_eq!(ranked.iter().map(|c| c.index).collect::<Vec<_>>(), vec![3, 1, 2, 0]);
    assert_relative_eq!(ranked[0].value, 1.3809667167492352, epsilon = 1e-9);
    assert_relative_eq!(ranked[2].value, 0.40895618770031755, epsilon = 1e-9);

    let err = ContributionRanker::new(ContributionType::Integral)
        .with_window(4.0, -2.0)
        .with_fermi(fermi)
        .rank_pdos_files(&files)
        .unwrap_err();
    assert!(matches!(err, QeError::EmptyWindow { .. }));
    Ok(())
}


#[test]
fn test_fermi_from_pwout() -> Result<()> {
    let pwout = PwOut::from_file(&get_fpath_in_current_dir!("pw.out"))?;
    assert_eq!(pwout.fermi_energy()?, 6.2376);
    Ok(())
}
