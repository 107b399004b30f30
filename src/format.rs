use std::fmt;

use colored::Colorize;
use itertools::iproduct;

use crate::{
    Result,
    qe_parsers::{
        projwfc::{
            AtomicState,
            ProjwfcOut,
        },
        pwin::AtomPosition,
    },
};


macro_rules! impl_builder_item {
    ($t: tt) => {
        pub fn $t(&mut self, arg: bool) -> &mut Self {
            self.$t = arg;
            self
        }
    };
}


fn spdf(l: i32) -> &'static str {
    match l {
        0 => "s",
        1 => "p",
        2 => "d",
        3 => "f",
        _ => "?",
    }
}


pub struct AtomicStatesFormat {
    _data            : Vec<AtomicState>,
    _positions       : Option<Vec<AtomPosition>>,

    print_position   : bool,
    print_spdf       : bool,
}


impl From<Vec<AtomicState>> for AtomicStatesFormat {
    fn from(data: Vec<AtomicState>) -> Self {
        Self {
            _data            : data,
            _positions       : None,
            print_position   : false,
            print_spdf       : true,
        }
    }
}


// Use non-consuming builder pattern
impl AtomicStatesFormat {
    impl_builder_item!(print_position);
    impl_builder_item!(print_spdf);

    pub fn positions(&mut self, positions: Vec<AtomPosition>) -> &mut Self {
        self._positions = Some(positions);
        self
    }
}


impl fmt::Display for AtomicStatesFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let soc = self._data.iter().any(AtomicState::is_soc);

        let mut header = format!("{:>6} {:>5}", "#state", "atom");
        if self._positions.is_some() { header += &format!(" {:>4}", "elem"); }
        if self.print_position       { header += &format!(" {:>9} {:>9} {:>9}", "x", "y", "z"); }
        header += &format!(" {:>3}", "l");
        if soc { header += &format!(" {:>4} {:>5}", "j", "m_j"); }
        else   { header += &format!(" {:>3}", "m"); }
        writeln!(f, "{}", header.bright_yellow())?;

        for (i, st) in self._data.iter().enumerate() {
            let mut line = format!("{:6} {:5}", i + 1, st.iatom + 1);

            let site = self._positions.as_ref().and_then(|p| p.get(st.iatom));
            if self._positions.is_some() {
                line += &format!(" {:>4}", site.map(|s| s.symbol.as_str()).unwrap_or("?"));
            }
            if self.print_position {
                match site {
                    Some(s) => line += &format!(" {:9.5} {:9.5} {:9.5}", s.position[0], s.position[1], s.position[2]),
                    None    => line += &format!(" {:>9} {:>9} {:>9}", "-", "-", "-"),
                }
            }

            if self.print_spdf { line += &format!(" {:>3}", spdf(st.l)); }
            else               { line += &format!(" {:3}", st.l); }

            if soc { line += &format!(" {:4.1} {:5.1}", st.j(), st.m_j()); }
            else   { line += &format!(" {:3}", st.m()); }

            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}


struct ProjectionRow {
    ik:      usize,
    ib:      usize,
    energy:  f64,
    sum:     f64,
    weights: Vec<(usize, f64)>,     // (state, weight) from large to small
}


pub struct ProjectionsFormat {
    _data            : Vec<ProjectionRow>,
    ntop             : usize,
    threshold        : f64,

    print_energy     : bool,
    print_sum        : bool,
    print_color      : bool,
}


impl ProjectionsFormat {
    /// Rows of the selected (k-point, band) pairs with the selected states sorted by weight.
    /// Energies are relative to `out.fermi`.
    pub fn from_projwfc(out: &ProjwfcOut, ks: &[usize], bs: &[usize], ws: &[usize]) -> Result<Self> {
        let (sorted, indices) = out.sort_atom_proj(Some(ks), Some(bs), Some(ws))?;
        let energies = out.get_energies(Some(ks), Some(bs))?;

        let ks = if ks.is_empty() { (0 .. out.nk()).collect() } else { ks.to_vec() };
        let bs = if bs.is_empty() { (0 .. out.nbnd()).collect() } else { bs.to_vec() };
        let ws = if ws.is_empty() { (0 .. out.natomwfc()).collect() } else { ws.to_vec() };

        let rows = iproduct!(ks.iter().enumerate(), bs.iter().enumerate())
            .map(|((i, &ik), (j, &ib))| {
                let weights = (0 .. ws.len())
                    .map(|w| (ws[indices[[i, j, w]]], sorted[[i, j, w]]))
                    .collect::<Vec<_>>();
                ProjectionRow {
                    ik,
                    ib,
                    energy: energies[[i, j]] - out.fermi,
                    sum: weights.iter().map(|w| w.1).sum(),
                    weights,
                }
            })
            .collect::<Vec<_>>();

        Ok(Self {
            _data            : rows,
            ntop             : 4,
            threshold        : 0.1,
            print_energy     : true,
            print_sum        : true,
            print_color      : true,
        })
    }

    impl_builder_item!(print_energy);
    impl_builder_item!(print_sum);
    impl_builder_item!(print_color);

    /// Number of leading states printed for each row, 0 prints all.
    pub fn ntop(&mut self, n: usize) -> &mut Self {
        self.ntop = n;
        self
    }

    /// Weights above this value are highlighted.
    pub fn threshold(&mut self, x: f64) -> &mut Self {
        self.threshold = x;
        self
    }
}


impl fmt::Display for ProjectionsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut header = format!("{:>6} {:>5}", "#kpt", "band");
        if self.print_energy { header += &format!(" {:>10}", "E-Ef(eV)"); }
        if self.print_sum    { header += &format!(" {:>6}", "sum"); }
        header += "  state:weight";
        writeln!(f, "{}", header.bright_yellow())?;

        for row in self._data.iter() {
            let mut line = format!("{:6} {:5}", row.ik + 1, row.ib + 1);
            if self.print_energy { line += &format!(" {:10.4}", row.energy); }
            if self.print_sum    { line += &format!(" {:6.3}", row.sum); }

            let n = if self.ntop == 0 { row.weights.len() } else { self.ntop.min(row.weights.len()) };
            for &(istate, w) in row.weights[.. n].iter() {
                let item = format!("{:>4}:{:5.3}", istate + 1, w);
                if self.print_color && w > self.threshold {
                    line += &format!("  {}", item.bright_green());
                } else {
                    line += &format!("  {}", item);
                }
            }

            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}


pub struct ContributionsFormat {
    _data            : Vec<(String, f64)>,
    print_rank       : bool,
}


impl From<Vec<(String, f64)>> for ContributionsFormat {
    fn from(data: Vec<(String, f64)>) -> Self {
        Self {
            _data            : data,
            print_rank       : true,
        }
    }
}


impl ContributionsFormat {
    impl_builder_item!(print_rank);
}


impl fmt::Display for ContributionsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self._data.iter().map(|d| d.0.len()).max().unwrap_or(0).max(7);

        let mut header = String::new();
        if self.print_rank { header += &format!("{:>5} ", "#rank"); }
        header += &format!("{:<width$} {:>14}", "orbital", "contribution", width = width);
        writeln!(f, "{}", header.bright_yellow())?;

        for (i, (label, value)) in self._data.iter().enumerate() {
            let mut line = String::new();
            if self.print_rank { line += &format!("{:5} ", i + 1); }
            line += &format!("{:<width$} {:14.6}", label, value, width = width);
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
