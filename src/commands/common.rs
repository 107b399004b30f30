use std::{
    borrow::Cow,
    io::{
        BufWriter,
        Write,
    },
    fs,
    path::Path,
};

use anyhow::{
    bail,
    Result,
    Context,
};
use log::info;
use itertools::Itertools;
use ndarray::ArrayView1;

use crate::{
    Schema,
    InputDeck,
    AtomPosition,
    PwOut,
};


/// Write equally long columns as a whitespace separated table, `header` labels each column.
pub fn write_columns_to_txt(file_name: &(impl AsRef<Path> + ?Sized), header: &[&str],
                            columns: &[ArrayView1<f64>]) -> Result<()> {
    let path = file_name.as_ref();
    let nrow = columns.first()
        .map(|c| c.len())
        .with_context(|| format!("[TXTOUT]: No column to write to {:?}", path))?;

    if header.len() != columns.len() {
        bail!("[TXTOUT]: {} labels given for {} columns", header.len(), columns.len());
    }
    if nrow == 0 || columns.iter().any(|c| c.len() != nrow) {
        bail!("[TXTOUT]: Columns for {:?} are empty or differ in length: {:?}",
              path, columns.iter().map(|c| c.len()).collect::<Vec<_>>());
    }

    let mut f = BufWriter::new(fs::File::create(path)
        .with_context(|| format!("[TXTOUT]: Cannot create {:?}", path))?);

    writeln!(f, "#{}", header.iter().map(|h| format!("{:>16}", h)).join(""))?;
    for irow in 0 .. nrow {
        writeln!(f, " {}", columns.iter().map(|c| format!("{:16.6}", c[irow])).join(""))?;
    }
    f.flush()?;

    info!("{} rows written to {:?}", nrow, path);
    Ok(())
}


/// The schema in `path`, or the bundled one.
pub fn load_schema(path: Option<&Path>) -> Result<Cow<'static, Schema>> {
    Ok(match path {
        Some(p) => {
            info!("Loading schema from {:?}", p);
            Cow::Owned(Schema::from_file(p)?)
        },
        None => Cow::Borrowed(Schema::builtin()?),
    })
}


pub fn load_deck(path: &Path, schema: Option<&Path>) -> Result<InputDeck> {
    let schema = load_schema(schema)?;
    InputDeck::from_file(path, &schema)
        .with_context(|| format!("[DECK]: Reading input deck {:?} failed", path))
}


pub fn load_positions(pwin: Option<&Path>) -> Result<Option<Vec<AtomPosition>>> {
    match pwin {
        Some(p) => Ok(Some(load_deck(p, None)?.atom_positions()?)),
        None => Ok(None),
    }
}


/// `--fermi` wins over `--pwout`, 0 when neither is given.
pub fn resolve_fermi(fermi: Option<f64>, pwout: Option<&Path>) -> Result<f64> {
    if let Some(ef) = fermi {
        return Ok(ef);
    }
    match pwout {
        Some(p) => {
            let ef = PwOut::from_file(p)?.fermi_energy()
                .with_context(|| format!("[FERMI]: Cannot get Fermi energy from {:?}", p))?;
            info!("Fermi energy read from {:?}: {} eV", p, ef);
            Ok(ef)
        },
        None => Ok(0.0),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use tempdir::TempDir;

    #[test]
    fn test_write_columns_to_txt() {
        let dir = TempDir::new("test_write_columns").unwrap();
        let fname = dir.path().join("out.txt");
        let x = Array1::from(vec![1.0, 2.0]);
        let y = Array1::from(vec![3.0, 4.0]);
        write_columns_to_txt(&fname, &["x", "y"], &[x.view(), y.view()]).unwrap();

        let txt = fs::read_to_string(&fname).unwrap();
        let lines = txt.lines().collect::<Vec<_>>();
        assert_eq!(lines[0].split_whitespace().collect::<Vec<_>>(), vec!["#", "x", "y"]);
        assert_eq!(lines[2].split_whitespace().collect::<Vec<_>>(), vec!["2.000000", "4.000000"]);
        assert_eq!(lines.len(), 3);

        let z = Array1::from(vec![1.0]);
        assert!(write_columns_to_txt(&fname, &["x", "z"], &[x.view(), z.view()]).is_err());
        assert!(write_columns_to_txt(&fname, &["x"], &[x.view(), y.view()]).is_err());
        assert!(write_columns_to_txt(&fname, &[], &[]).is_err());
    }

    #[test]
    fn test_resolve_fermi() {
        let dir = TempDir::new("test_fermi").unwrap();
        let fname = dir.path().join("pw.out");
        fs::write(&fname, "     the Fermi energy is     6.4557 ev\n").unwrap();
        assert_eq!(resolve_fermi(Some(1.0), Some(fname.as_path())).unwrap(), 1.0);
        assert_eq!(resolve_fermi(None, Some(fname.as_path())).unwrap(), 6.4557);
        assert_eq!(resolve_fermi(None, None).unwrap(), 0.0);
    }
}
