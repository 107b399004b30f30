use ndarray::{
    Array1,
    Array2,
    Array3,
};

pub use crate::error::{
    QeError,
    Result,
};

pub type Vector<T> = Array1<T>;  // Define this type to use broadcast operations.
pub type Matrix<T> = Array2<T>;
pub type Cube<T>   = Array3<T>;
pub type MatX3<T> = Vec<[T;3]>;  // Nx3 matrix


/// Parse a selection token into 1-based indices.
///
/// Accepted forms: `3`, `-1`, `2..5` (inclusive) and `-3..-1`. A `0` selects everything,
/// see `index_transform`.
pub fn range_parse(input: &str) -> Result<Vec<i32>> {
    let parse_one = |s: &str| -> Result<i32> {
        s.trim().parse::<i32>()
            .map_err(|_| QeError::Parse(format!("invalid index `{}` in selection `{}`", s, input)))
    };

    if let Some((lo, hi)) = input.split_once("..") {
        let lo = parse_one(lo)?;
        let hi = parse_one(hi)?;
        if lo.signum() * hi.signum() < 0 || lo > hi {
            return Err(QeError::Parse(format!("invalid range `{}`", input)));
        }
        Ok((lo ..= hi).collect())
    } else {
        Ok(vec![parse_one(input)?])
    }
}


/// Turn 1-based (possibly negative) indices into 1-based positive ones, `0` means all.
pub fn index_transform(v: Vec<i32>, len: usize) -> Vec<usize> {
    if v.contains(&0) {
        (1 ..= len).collect()
    } else {
        v.into_iter()
         .map(|i| {
            if i < 0 {
                i.rem_euclid(len as i32) as usize + 1
            } else {
                i as usize
            }
         })
        .collect()
    }
}


/// Parse a whitespace separated selection string into sorted, deduplicated 0-based indices.
///
/// `None` selects every index in `0 .. len`.
pub fn parse_selection(input: Option<&str>, len: usize) -> Result<Vec<usize>> {
    let input = match input {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok((0 .. len).collect()),
    };

    let mut ret = input.split_whitespace()
        .map(range_parse)
        .collect::<Result<Vec<Vec<i32>>>>()?
        .into_iter()
        .flat_map(|x| index_transform(x, len).into_iter())
        .collect::<Vec<usize>>();

    if let Some(&i) = ret.iter().find(|&&i| i == 0 || i > len) {
        return Err(QeError::Parse(format!("index {} out of range 1..={}", i, len)));
    }

    ret.iter_mut().for_each(|i| *i -= 1);
    ret.sort_unstable();
    ret.dedup();
    Ok(ret)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_parse() {
        assert_eq!(range_parse("3").unwrap(), vec![3]);
        assert_eq!(range_parse("2..4").unwrap(), vec![2, 3, 4]);
        assert_eq!(range_parse("-3..-1").unwrap(), vec![-3, -2, -1]);
        assert!(range_parse("-1..2").is_err());
        assert!(range_parse("4..2").is_err());
        assert!(range_parse("x").is_err());
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection(None, 4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_selection(Some("  "), 3).unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_selection(Some("1..2 -1 2"), 5).unwrap(), vec![0, 1, 4]);
        assert_eq!(parse_selection(Some("0"), 3).unwrap(), vec![0, 1, 2]);
        assert!(parse_selection(Some("9"), 3).is_err());
    }
}
