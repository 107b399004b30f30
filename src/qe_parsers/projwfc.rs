//! Output of projwfc.x: problem sizes, the atomic states used for the projection and the
//! projection of every Kohn-Sham state onto those atomic states.
//!
//! The header (problem sizes and atomic states) is read at construction. The projection
//! section is large, it is only scanned when `read_projections` is called, starting from
//! the line offset remembered while reading the header.

use std::{
    fs::File,
    io::{
        self,
        BufRead,
        BufReader,
        Cursor,
    },
    path::{
        Path,
        PathBuf,
    },
};

use ndarray::{
    Axis,
    s,
};
use log::{
    debug,
    info,
    warn,
};

use crate::{
    error::{
        QeError,
        Result,
    },
    types::{
        Vector,
        Matrix,
        Cube,
    },
};


const PROBLEM_SIZES: &str       = "Problem Sizes";
const ATOMIC_STATES: &str       = "Atomic states used for projection";
const KPOINT_MARKER: &str       = "k = ";
const LOWDIN_SENTINEL: &str     = "Lowdin Charges:";
const PSI_SQUARED: &str         = "|psi|^2";
/// Five problem size lines plus four fixed lines around the atomic state table.
const PROJECTION_BLOCK_OFFSET: usize = 9;


/// Dimensions printed in the `Problem Sizes` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProblemSize {
    /// Number of atomic wavefunctions (orbitals) used for the projection.
    pub natomwfc: usize,
    pub nbnd:     usize,
    /// Total number of k-points, over both spin channels.
    pub nkstot:   usize,
    pub npwx:     usize,
    pub nkb:      usize,
}


impl ProblemSize {
    /// Number of k-points stored in the projection tensor.
    ///
    /// `nkstot` is halved unconditionally, the output is assumed spin doubled.
    pub fn nk(&self) -> usize {
        self.nkstot / 2
    }
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AngularMomentum {
    /// Scalar relativistic state labelled by the magnetic quantum number.
    Collinear { m: i32 },
    /// Spin-orbit state labelled by total angular momentum and its projection.
    SpinOrbit { j: f64, m_j: f64 },
}


/// One atomic wavefunction the Kohn-Sham states are projected on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomicState {
    /// Owner atom, counts from 0.
    pub iatom:    usize,
    pub l:        i32,
    pub momentum: AngularMomentum,
}


impl AtomicState {
    /// Magnetic quantum number, 0 for spin-orbit states.
    pub fn m(&self) -> i32 {
        match self.momentum {
            AngularMomentum::Collinear { m } => m,
            AngularMomentum::SpinOrbit { .. } => 0,
        }
    }

    /// Total angular momentum, 0 for collinear states.
    pub fn j(&self) -> f64 {
        match self.momentum {
            AngularMomentum::SpinOrbit { j, .. } => j,
            AngularMomentum::Collinear { .. } => 0.0,
        }
    }

    pub fn m_j(&self) -> f64 {
        match self.momentum {
            AngularMomentum::SpinOrbit { m_j, .. } => m_j,
            AngularMomentum::Collinear { .. } => 0.0,
        }
    }

    pub fn is_soc(&self) -> bool {
        matches!(self.momentum, AngularMomentum::SpinOrbit { .. })
    }
}


/// Dense projection data, allocated once and filled k-point by k-point.
#[derive(Debug, Clone, PartialEq)]
pub struct Projections {
    pub kpoints: Matrix<f64>,   // [ikpoint, 3]
    pub eigs:    Matrix<f64>,   // [ikpoint, iband], in eV
    pub proj:    Cube<f64>,     // [ikpoint, iband, iatomwfc]
    /// Leading k-points actually decoded, rows from here on stay zero.
    pub nk_read: usize,
}


impl Projections {
    fn zeros(size: &ProblemSize) -> Self {
        let nk = size.nk();
        Self {
            kpoints: Matrix::zeros((nk, 3)),
            eigs:    Matrix::zeros((nk, size.nbnd)),
            proj:    Cube::zeros((nk, size.nbnd, size.natomwfc)),
            nk_read: 0,
        }
    }
}


/// Decoded content of a single k-point block.
#[derive(Debug, Clone, PartialEq)]
pub struct KpointProjection {
    pub kvec:    [f64; 3],
    pub eigs:    Vector<f64>,   // [iband]
    pub weights: Matrix<f64>,   // [iband, iatomwfc]
}


#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Text(String),
}


#[derive(Debug, Clone)]
pub struct ProjwfcOut {
    source:                 Source,
    pub size:               ProblemSize,
    pub states:             Vec<AtomicState>,
    /// Lines to skip before the projection section, see `read_header`.
    pub start_projection_block: usize,
    /// Reference energy in eV, 0 unless set by the caller.
    pub fermi:              f64,
    projections:            Option<Projections>,
    proj_read:              bool,
}


impl ProjwfcOut {
    pub fn from_file(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QeError::FileNotFound { path: path.to_path_buf() });
        }
        info!("Reading projwfc.x output {:?}", path);
        let f = BufReader::new(File::open(path)?);
        let (size, states, start) = Self::read_header(f)?;
        Ok(Self::assemble(Source::File(path.to_path_buf()), size, states, start))
    }

    pub fn from_text(txt: &str) -> Result<Self> {
        let (size, states, start) = Self::read_header(Cursor::new(txt.as_bytes()))?;
        Ok(Self::assemble(Source::Text(txt.to_string()), size, states, start))
    }

    fn assemble(source: Source, size: ProblemSize, states: Vec<AtomicState>, start: usize) -> Self {
        debug!("natomwfc = {}, nbnd = {}, nkstot = {}, projection block starts at line {}",
               size.natomwfc, size.nbnd, size.nkstot, start);
        Self {
            source,
            size,
            states,
            start_projection_block: start,
            fermi: 0.0,
            projections: None,
            proj_read: false,
        }
    }

    /// Scan for the problem sizes and the atomic state table.
    ///
    /// The line index used for `start_projection_block` only counts the lines visited by this
    /// scan, the lines consumed by the two block readers are not counted. Starting a plain
    /// line scan `start_projection_block` lines into the file therefore lands at (or just
    /// before) the first k-point.
    fn read_header(reader: impl BufRead) -> Result<(ProblemSize, Vec<AtomicState>, usize)> {
        let mut lines = reader.lines();
        let mut size: Option<ProblemSize> = None;

        let mut line_index = 0usize;
        while let Some(line) = lines.next() {
            let line = line?;

            if line.contains(PROBLEM_SIZES) {
                size = Some(Self::read_problem_size(&mut lines)?);
            } else if line.contains(ATOMIC_STATES) {
                let size = size.ok_or_else(|| QeError::InvalidState(
                        format!("`{}` found before `{}`", ATOMIC_STATES, PROBLEM_SIZES)))?;
                let start = line_index + size.natomwfc + PROJECTION_BLOCK_OFFSET;
                let states = Self::read_atomic_states(&mut lines, size.natomwfc)?;
                return Ok((size, states, start));
            }

            line_index += 1;
        }

        Err(QeError::InvalidState(match size {
            None    => format!("`{}` block not found", PROBLEM_SIZES),
            Some(_) => format!("`{}` block not found", ATOMIC_STATES),
        }))
    }

    /// The five lines after the marker, the third token of each is the value.
    fn read_problem_size<I>(lines: &mut I) -> Result<ProblemSize>
    where I: Iterator<Item = io::Result<String>> {
        let mut v = [0usize; 5];
        for x in v.iter_mut() {
            let line = next_line(lines)?;
            *x = line.split_whitespace()
                .nth(2)
                .and_then(|t| t.parse::<usize>().ok())
                .ok_or_else(|| QeError::unrecognized(&line))?;
        }
        let [natomwfc, nbnd, nkstot, npwx, nkb] = v;
        Ok(ProblemSize { natomwfc, nbnd, nkstot, npwx, nkb })
    }

    fn read_atomic_states<I>(lines: &mut I, natomwfc: usize) -> Result<Vec<AtomicState>>
    where I: Iterator<Item = io::Result<String>> {
        // "(read from pseudopotential files):" and an empty line
        next_line(lines)?;
        next_line(lines)?;

        (0 .. natomwfc)
            .map(|_| next_line(lines).and_then(|l| Self::parse_atomic_state(&l)))
            .collect()
    }

    /// `state #   1: atom   1 (Si ), wfc  1 (l=0 m= 1)`
    /// `state #   1: atom   1 (Pt ), wfc  1 (l=0 j=0.5 m_j=-0.5)`
    fn parse_atomic_state(line: &str) -> Result<AtomicState> {
        let err = || QeError::unrecognized(line);
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        if tokens.len() < 11 {
            return Err(err());
        }

        let unsigned = |tok: &str| regex!(r"[0-9.]+").find(tok).map(|m| m.as_str().to_string());
        let signed   = |tok: &str| regex!(r"[-0-9.]+").find(tok).map(|m| m.as_str().to_string());

        let iatom = tokens[4].parse::<usize>().ok()
            .and_then(|i| i.checked_sub(1))
            .ok_or_else(err)?;
        let l = unsigned(tokens[9]).and_then(|s| s.parse::<i32>().ok()).ok_or_else(err)?;

        let momentum = if tokens[10].contains('m') {
            let m = tokens.get(11)
                .and_then(|&t| unsigned(t))
                .and_then(|s| s.parse::<i32>().ok())
                .ok_or_else(err)?;
            AngularMomentum::Collinear { m }
        } else if tokens[10].contains('j') {
            let j = unsigned(tokens[10]).and_then(|s| s.parse::<f64>().ok()).ok_or_else(err)?;
            let m_j = tokens.last()
                .and_then(|&t| signed(t))
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(err)?;
            AngularMomentum::SpinOrbit { j, m_j }
        } else {
            return Err(err());
        };

        Ok(AtomicState { iatom, l, momentum })
    }

    pub fn with_fermi(mut self, fermi: f64) -> Self {
        self.fermi = fermi;
        self
    }

    pub fn nk(&self) -> usize {
        self.size.nk()
    }

    pub fn nbnd(&self) -> usize {
        self.size.nbnd
    }

    pub fn natomwfc(&self) -> usize {
        self.size.natomwfc
    }

    /// Whether the states carry spin-orbit (j, m_j) labels.
    pub fn soc(&self) -> bool {
        self.states.iter().any(AtomicState::is_soc)
    }

    pub fn is_projections_read(&self) -> bool {
        self.proj_read
    }

    /// Scan the projection section once, later calls return the stored data.
    ///
    /// When decoding fails the k-points decoded so far are kept but the object is not marked
    /// as read, the next call scans again from the beginning of the section.
    pub fn read_projections(&mut self) -> Result<&Projections> {
        if !self.proj_read {
            let mut proj = self.projections.take()
                .unwrap_or_else(|| Projections::zeros(&self.size));

            let ret = self.open_source()
                .and_then(|reader| Self::scan_projections(reader, &self.size,
                                                          self.start_projection_block, &mut proj));
            self.projections = Some(proj);
            ret?;
            self.proj_read = true;
        }
        self.projections()
    }

    fn open_source(&self) -> Result<Box<dyn BufRead + '_>> {
        Ok(match &self.source {
            Source::File(path) => Box::new(BufReader::new(File::open(path)?)),
            Source::Text(txt)  => Box::new(Cursor::new(txt.as_bytes())),
        })
    }

    fn scan_projections(reader: impl BufRead, size: &ProblemSize, start: usize, proj: &mut Projections) -> Result<()> {
        let nk = size.nk();
        let mut nblocks = 0usize;
        proj.nk_read = 0;

        for (ik, block) in KBlocks::new(reader.lines().skip(start)).enumerate() {
            let block = block?;
            let first_line = block.first().cloned().unwrap_or_default();
            let wrap = |e: QeError| QeError::ProjectionDecodeError {
                ikpoint: ik, first_line: first_line.clone(), source: Box::new(e)
            };

            if ik >= nk {
                return Err(wrap(QeError::InvalidState(
                    format!("more k-point blocks than the expected {}", nk))));
            }

            let kp = decode_kblock(&block, size, ik).map_err(wrap)?;
            proj.kpoints.row_mut(ik).assign(&Vector::from(kp.kvec.to_vec()));
            proj.eigs.row_mut(ik).assign(&kp.eigs);
            proj.proj.index_axis_mut(Axis(0), ik).assign(&kp.weights);
            nblocks += 1;
            proj.nk_read = nblocks;
        }

        if nblocks < nk {
            warn!("Only {} of {} k-point blocks found in the projection section", nblocks, nk);
        }
        info!("Projections of {} k-points read", nblocks);
        Ok(())
    }

    pub fn projections(&self) -> Result<&Projections> {
        match (self.proj_read, self.projections.as_ref()) {
            (true, Some(p)) => Ok(p),
            _ => Err(QeError::InvalidState("projections are not read, call `read_projections` first".to_string())),
        }
    }

    pub fn kpoints(&self) -> Result<&Matrix<f64>> {
        Ok(&self.projections()?.kpoints)
    }

    pub fn eigenvalues(&self) -> Result<&Matrix<f64>> {
        Ok(&self.projections()?.eigs)
    }

    /// Projections selected by the outer product of the index lists; `None` or an empty list
    /// selects the whole axis.
    pub fn get_projections(&self, kpoints: Option<&[usize]>, bands: Option<&[usize]>,
                           atomwfcs: Option<&[usize]>) -> Result<Cube<f64>> {
        let p = self.projections()?;
        let ks = select_axis(kpoints,  self.nk(),       "k-point")?;
        let bs = select_axis(bands,    self.nbnd(),     "band")?;
        let ws = select_axis(atomwfcs, self.natomwfc(), "atomic wavefunction")?;
        Ok(p.proj
            .select(Axis(0), &ks)
            .select(Axis(1), &bs)
            .select(Axis(2), &ws))
    }

    pub fn get_energies(&self, kpoints: Option<&[usize]>, bands: Option<&[usize]>) -> Result<Matrix<f64>> {
        let p = self.projections()?;
        let ks = select_axis(kpoints, self.nk(),   "k-point")?;
        let bs = select_axis(bands,   self.nbnd(), "band")?;
        Ok(p.eigs
            .select(Axis(0), &ks)
            .select(Axis(1), &bs))
    }

    /// Sort the selected projections of every (k, band) in descending order.
    ///
    /// Returns the sorted weights and, for each of them, the index of the atomic wavefunction
    /// inside the selection.
    pub fn sort_atom_proj(&self, kpoints: Option<&[usize]>, bands: Option<&[usize]>,
                          atomwfcs: Option<&[usize]>) -> Result<(Cube<f64>, Cube<usize>)> {
        let selected = self.get_projections(kpoints, bands, atomwfcs)?;
        let mut sorted  = selected.clone();
        let mut indices = Cube::<usize>::zeros(selected.raw_dim());

        for ((lane, mut out), mut idx) in selected.lanes(Axis(2)).into_iter()
            .zip(sorted.lanes_mut(Axis(2)))
            .zip(indices.lanes_mut(Axis(2)))
        {
            let mut order = (0 .. lane.len()).collect::<Vec<usize>>();
            order.sort_by(|&a, &b| lane[b].total_cmp(&lane[a]));
            for (i, &o) in order.iter().enumerate() {
                out[i] = lane[o];
                idx[i] = o;
            }
        }

        Ok((sorted, indices))
    }

    /// (k, band, atomwfc) triples, in absolute indices, whose projection is exactly zero.
    pub fn get_zero_projections(&self, kpoints: Option<&[usize]>, bands: Option<&[usize]>,
                                atomwfcs: Option<&[usize]>) -> Result<Vec<(usize, usize, usize)>> {
        let selected = self.get_projections(kpoints, bands, atomwfcs)?;
        let ks = select_axis(kpoints,  self.nk(),       "k-point")?;
        let bs = select_axis(bands,    self.nbnd(),     "band")?;
        let ws = select_axis(atomwfcs, self.natomwfc(), "atomic wavefunction")?;

        Ok(selected.indexed_iter()
            .filter(|&(_, &v)| v == 0.0)
            .map(|((i, j, k), _)| (ks[i], bs[j], ws[k]))
            .collect())
    }

    /// For every state in `istates`, the bands at k-point `ik` projecting more than `threshold`.
    pub fn extract_atom_bands(&self, ik: usize, istates: &[usize], threshold: f64) -> Result<Vec<Vec<usize>>> {
        let p = self.projections()?;
        if ik >= self.nk() {
            return Err(QeError::InvalidState(format!("k-point index {} out of range 0..{}", ik, self.nk())));
        }
        select_axis(Some(istates), self.natomwfc(), "atomic wavefunction")?;

        let at_k = p.proj.index_axis(Axis(0), ik);
        Ok(istates.iter()
            .map(|&istate| {
                at_k.slice(s![.., istate])
                    .indexed_iter()
                    .filter(|&(_, &v)| v > threshold)
                    .map(|(ib, _)| ib)
                    .collect()
            })
            .collect())
    }

    /// (k, band, sum) of every state whose projections sum outside of [0, 1 + tol].
    ///
    /// This checks the data, not the parser, violations are only logged.
    pub fn check_projection_sums(&self, tol: f64) -> Result<Vec<(usize, usize, f64)>> {
        let p = self.projections()?;
        let sums = p.proj.sum_axis(Axis(2));
        let bad = sums.indexed_iter()
            .filter(|&(_, &v)| v < 0.0 || v > 1.0 + tol)
            .map(|((ik, ib), &v)| (ik, ib, v))
            .collect::<Vec<_>>();
        for (ik, ib, v) in bad.iter() {
            warn!("Projections of k-point #{} band #{} sum up to {:.4}", ik, ib, v);
        }
        Ok(bad)
    }
}


fn next_line<I>(lines: &mut I) -> Result<String>
where I: Iterator<Item = io::Result<String>> {
    match lines.next() {
        Some(line) => Ok(line?),
        None => Err(QeError::InvalidState("unexpected end of file in projwfc.x header".to_string())),
    }
}


fn select_axis(sel: Option<&[usize]>, len: usize, what: &str) -> Result<Vec<usize>> {
    match sel {
        Some(v) if !v.is_empty() => {
            if let Some(i) = v.iter().find(|&&i| i >= len) {
                return Err(QeError::InvalidState(format!("{} index {} out of range 0..{}", what, i, len)));
            }
            Ok(v.to_vec())
        },
        _ => Ok((0 .. len).collect()),
    }
}


/// Splits the projection section into k-point blocks.
///
/// A `k = ` line opens a block when none is open; the next `k = ` line closes it and is
/// consumed with it, the block is yielded without that closing line. A block still open at
/// the `Lowdin Charges:` sentinel or at the end of input is dropped. Single forward pass,
/// restart by building a new scan.
pub struct KBlocks<I> {
    lines: I,
    done:  bool,
}


impl<I> KBlocks<I>
where I: Iterator<Item = io::Result<String>> {
    pub fn new(lines: I) -> Self {
        Self { lines, done: false }
    }
}


impl<I> Iterator for KBlocks<I>
where I: Iterator<Item = io::Result<String>> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut block: Option<Vec<String>> = None;
        for line in self.lines.by_ref() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                },
            };

            if line.contains(LOWDIN_SENTINEL) {
                break;
            }

            if line.contains(KPOINT_MARKER) {
                match block.take() {
                    None    => block = Some(vec![line]),
                    Some(b) => return Some(Ok(b)),
                }
                continue;
            }

            if let Some(b) = block.as_mut() {
                b.push(line);
            }
        }

        self.done = true;
        None
    }
}


/// Decode one k-point block.
///
/// ```text
///  k =   0.0000000000  0.0000000000  0.0000000000
/// ==== e(   1) =    -5.66246 eV ====
///      psi = 0.500*[#   1]+0.500*[#   5]+
///     |psi|^2 = 1.000
/// ==== e(   2) =     6.18883 eV ====
/// ...
/// ```
pub fn decode_kblock(lines: &[String], size: &ProblemSize, ik: usize) -> Result<KpointProjection> {
    let nbnd = size.nbnd;
    let natomwfc = size.natomwfc;
    let err = |line: &str, iband: Option<usize>| QeError::UnrecognizedFormat {
        line: line.to_string(), ikpoint: Some(ik), iband
    };

    let first = lines.first().map(String::as_str).unwrap_or_default();
    let caps = regex!(r"k\s*=\s*([-+]?\d+\.\d+)\s*([-+]?\d+\.\d+)\s*([-+]?\d+\.\d+)")
        .captures(first)
        .ok_or_else(|| err(first, None))?;
    let mut kvec = [0.0f64; 3];
    for (i, x) in kvec.iter_mut().enumerate() {
        *x = caps[i + 1].parse::<f64>().map_err(|_| err(first, None))?;
    }

    let mut eigs = Vector::<f64>::zeros(nbnd);
    let mut weights = Matrix::<f64>::zeros((nbnd, natomwfc));

    let mut iline = 1usize;
    loop {
        let line = lines.get(iline)
            .ok_or_else(|| err("<missing band marker>", None))?;
        let caps = regex!(r"==== e\(\s*(\d+)\s*\)\s*=\s*([-+]?[0-9.]+(?:[eE][-+]?\d+)?)\s*eV\s*====")
            .captures(line)
            .ok_or_else(|| err(line, None))?;
        let iband = caps[1].parse::<usize>().ok()
            .and_then(|i| i.checked_sub(1))
            .filter(|&i| i < nbnd)
            .ok_or_else(|| err(line, None))?;
        eigs[iband] = caps[2].parse::<f64>().map_err(|_| err(line, Some(iband)))?;

        loop {
            iline += 1;
            let line = lines.get(iline)
                .ok_or_else(|| err("<missing |psi|^2 line>", Some(iband)))?;
            if line.contains(PSI_SQUARED) {
                break;
            }

            let content = regex!(r"^\s*psi\s*=\s*").replace(line, "");
            for (w, iwfc) in parse_weights(&content).ok_or_else(|| err(line, Some(iband)))? {
                if iwfc == 0 || iwfc > natomwfc {
                    return Err(err(line, Some(iband)));
                }
                weights[[iband, iwfc - 1]] = w;
            }
        }

        // The last |psi|^2 of the block is followed by blank lines only.
        if lines[iline + 1 ..].iter().all(|l| l.trim().is_empty()) {
            break;
        }
        iline += 1;
    }

    Ok(KpointProjection { kvec, eigs, weights })
}


/// `0.244*[#   2]+0.244*[#   3]+` -> [(0.244, 2), (0.244, 3)]
fn parse_weights(line: &str) -> Option<Vec<(f64, usize)>> {
    let cleaned = regex!(r"\*\[#|\]|\+").replace_all(line, " ");
    let tokens = cleaned.split_whitespace().collect::<Vec<_>>();
    if tokens.len() % 2 != 0 {
        return None;
    }
    tokens.chunks(2)
        .map(|pair| Some((pair[0].parse::<f64>().ok()?, pair[1].parse::<usize>().ok()?)))
        .collect()
}
