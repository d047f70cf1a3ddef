use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::{Debug, Formatter};
use bit_set::BitSet;
use instant::{Duration, Instant};
use log::{debug, info, trace};
use smallvec::SmallVec;
use thiserror::Error;

/// The expected maximum length for a single slot.
pub const MAX_SLOT_LENGTH: usize = 21;

/// An identifier for a given letter, based on its index in the word list's `glyphs` field.
pub type GlyphId = usize;

/// An identifier for a given slot, based on its index in the puzzle's `slots` field.
pub type SlotId = usize;

/// An identifier for a given word, based on its index in the word list's `words` field. Since the
/// word list is sorted, comparing ids is the same as comparing the words lexicographically.
pub type WordId = usize;

/// Zero-indexed (row, col) coords for a cell in the grid, where row = 0 is the top row.
pub type GridCoord = (usize, usize);

/// For an ordered pair of slots `(a, b)`, the index of the shared cell within `a` and within `b`.
pub type Overlap = (usize, usize);

/// A partial or complete mapping from slots to the words chosen for them.
pub type Assignment = BTreeMap<SlotId, WordId>;

/// An arc `(x, y)` means "x must be revised with respect to y".
pub type Arc = (SlotId, SlotId);

/// Errors surfaced while loading a grid template or a word list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("grid template is empty")]
    EmptyTemplate,
    #[error("grid template has no runs of two or more open cells")]
    NoSlots,
    #[error("unexpected character {ch:?} in grid template at row {row}, column {col}")]
    UnexpectedCell { ch: char, row: usize, col: usize },
    #[error("word list is empty")]
    EmptyWordList,
    #[error("word {0:?} contains characters other than ASCII letters")]
    BadWord(String),
}

/// Direction that a slot is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Across,
    Down,
}

/// A slot in the grid: the variable of the fill problem. Slots compare by origin (row-major),
/// then direction, then length, which is the order ids are handed out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    pub start_cell: GridCoord,
    pub direction: Direction,
    pub length: usize,
}

impl Slot {
    pub fn new(start_cell: GridCoord, direction: Direction, length: usize) -> Slot {
        Slot { start_cell, direction, length }
    }

    /// The coords of the cell at `cell_idx` within this slot.
    pub fn cell(&self, cell_idx: usize) -> GridCoord {
        let (row, col) = self.start_cell;
        match self.direction {
            Direction::Across => (row, col + cell_idx),
            Direction::Down => (row + cell_idx, col),
        }
    }

    /// Generate the coords for each cell of this slot.
    pub fn cell_coords(&self) -> impl Iterator<Item = GridCoord> {
        let slot = *self;
        (0..slot.length).map(move |cell_idx| slot.cell(cell_idx))
    }
}

/// A single cell of the grid structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Block,
    /// An open cell, optionally pre-filled with a letter that any fill has to keep.
    Open(Option<char>),
}

/// The static shape of a puzzle: the grid structure, the slots, and the overlap table. Nothing
/// here changes during filling.
#[derive(Debug, Clone)]
pub struct Puzzle {
    height: usize,
    width: usize,
    cells: Vec<Vec<Cell>>,
    slots: Vec<Slot>,
    overlaps: Vec<Vec<Option<Overlap>>>,
    neighbors: Vec<Vec<SlotId>>,
}

impl Puzzle {
    /// Build a puzzle directly from slot geometry. Every cell covered by a slot is open and every
    /// other cell is a block; the grid is just large enough to hold all slots.
    pub fn new(slots: Vec<Slot>) -> Puzzle {
        let height = slots.iter()
            .flat_map(|slot| slot.cell_coords())
            .map(|(row, _)| row + 1)
            .max()
            .unwrap_or(0);
        let width = slots.iter()
            .flat_map(|slot| slot.cell_coords())
            .map(|(_, col)| col + 1)
            .max()
            .unwrap_or(0);

        let mut cells = vec![vec![Cell::Block; width]; height];
        for (row, col) in slots.iter().flat_map(|slot| slot.cell_coords()) {
            cells[row][col] = Cell::Open(None);
        }

        Puzzle::with_cells(cells, slots)
    }

    /// Parse a grid template, with `#` representing blocks, `_` or `.` representing empty cells,
    /// and letters representing themselves. Rows shorter than the widest row are padded with
    /// blocks.
    pub fn from_template(template: &str) -> Result<Puzzle, LoadError> {
        let mut cells: Vec<Vec<Cell>> = vec![];

        for line in template.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let row = cells.len();
            let parsed = line.chars().enumerate().map(|(col, ch)| match ch {
                '#' => Ok(Cell::Block),
                '_' | '.' => Ok(Cell::Open(None)),
                ch if ch.is_ascii_alphabetic() => Ok(Cell::Open(Some(ch.to_ascii_uppercase()))),
                ch => Err(LoadError::UnexpectedCell { ch, row, col }),
            }).collect::<Result<Vec<Cell>, LoadError>>()?;
            cells.push(parsed);
        }

        let width = cells.iter().map(|row| row.len()).max().ok_or(LoadError::EmptyTemplate)?;
        for row in &mut cells {
            row.resize(width, Cell::Block);
        }

        // Each maximal run of two or more open cells is a slot. Down slots are found by scanning
        // the transposed grid.
        fn runs(line: impl Iterator<Item = Cell>) -> Vec<(usize, usize)> {
            let mut result = vec![];
            let mut run_start = None;
            let mut line_length = 0;

            for (idx, cell) in line.enumerate() {
                line_length = idx + 1;
                match (cell, run_start) {
                    (Cell::Open(_), None) => run_start = Some(idx),
                    (Cell::Block, Some(start)) => {
                        if idx - start > 1 {
                            result.push((start, idx - start));
                        }
                        run_start = None;
                    }
                    _ => {}
                }
            }
            if let Some(start) = run_start {
                if line_length - start > 1 {
                    result.push((start, line_length - start));
                }
            }

            result
        }

        let mut slots = vec![];
        for (row, line) in cells.iter().enumerate() {
            for (col, length) in runs(line.iter().copied()) {
                slots.push(Slot::new((row, col), Direction::Across, length));
            }
        }
        for col in 0..width {
            for (row, length) in runs(cells.iter().map(|line| line[col])) {
                slots.push(Slot::new((row, col), Direction::Down, length));
            }
        }

        if slots.is_empty() {
            return Err(LoadError::NoSlots);
        }

        Ok(Puzzle::with_cells(cells, slots))
    }

    fn with_cells(cells: Vec<Vec<Cell>>, mut slots: Vec<Slot>) -> Puzzle {
        slots.sort();
        slots.dedup();

        let slot_count = slots.len();
        let mut overlaps = vec![vec![None; slot_count]; slot_count];

        // The overlap for a pair is their first shared cell, taken in the lower id's cell order and
        // mirrored for the other direction so that `overlap(a, b)` and `overlap(b, a)` agree.
        for a in 0..slot_count {
            for b in a + 1..slot_count {
                let overlap = slots[a].cell_coords().enumerate().find_map(|(cell_a, coord)| {
                    slots[b].cell_coords().position(|other| other == coord).map(|cell_b| (cell_a, cell_b))
                });
                if let Some((cell_a, cell_b)) = overlap {
                    overlaps[a][b] = Some((cell_a, cell_b));
                    overlaps[b][a] = Some((cell_b, cell_a));
                }
            }
        }

        let neighbors: Vec<Vec<SlotId>> = overlaps.iter()
            .map(|row| {
                row.iter().enumerate()
                    .filter(|(_, overlap)| overlap.is_some())
                    .map(|(id, _)| id)
                    .collect::<Vec<SlotId>>()
            })
            .collect();

        Puzzle {
            height: cells.len(),
            width: cells.first().map_or(0, |row| row.len()),
            cells,
            slots,
            overlaps,
            neighbors,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, slot_id: SlotId) -> &Slot {
        &self.slots[slot_id]
    }

    /// Look up the id of a slot by its geometry.
    pub fn slot_id(&self, slot: &Slot) -> Option<SlotId> {
        self.slots.binary_search(slot).ok()
    }

    pub fn cell(&self, (row, col): GridCoord) -> Cell {
        self.cells.get(row).and_then(|line| line.get(col)).copied().unwrap_or(Cell::Block)
    }

    pub fn overlap(&self, a: SlotId, b: SlotId) -> Option<Overlap> {
        self.overlaps[a][b]
    }

    /// Every slot sharing a cell with the given one, in id order.
    pub fn neighbors(&self, slot_id: SlotId) -> &[SlotId] {
        &self.neighbors[slot_id]
    }
}

/// A struct representing a word that can be chosen for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub string: String,
    pub glyphs: SmallVec<[GlyphId; MAX_SLOT_LENGTH]>,
}

impl Word {
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// The candidate words, uppercased, de-duplicated and sorted, along with the set of distinct
/// letters they use.
pub struct WordList {
    pub glyphs: Vec<char>,
    pub words: Vec<Word>,
    glyph_ids_by_char: HashMap<char, GlyphId>,
}

impl Debug for WordList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordList")
            .field("glyphs", &self.glyphs)
            .field("words", &(["(", &self.words.len().to_string(), " entries)"].join("")))
            .finish()
    }
}

impl WordList {
    /// Build a word list. Surrounding whitespace is trimmed and blank entries are skipped; every
    /// other entry has to consist of ASCII letters.
    pub fn new<I, S>(entries: I) -> Result<WordList, LoadError>
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
    {
        let mut strings: BTreeSet<String> = BTreeSet::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if !entry.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(LoadError::BadWord(entry.to_string()));
            }
            strings.insert(entry.to_ascii_uppercase());
        }

        if strings.is_empty() {
            return Err(LoadError::EmptyWordList);
        }

        let glyphs: Vec<char> = strings.iter()
            .flat_map(|string| string.chars())
            .collect::<BTreeSet<char>>()
            .into_iter()
            .collect();
        let glyph_ids_by_char: HashMap<char, GlyphId> =
            glyphs.iter().enumerate().map(|(id, &glyph)| (glyph, id)).collect();

        let words = strings.into_iter().map(|string| {
            let glyphs = string.chars().map(|c| glyph_ids_by_char[&c]).collect();
            Word { string, glyphs }
        }).collect();

        Ok(WordList { glyphs, words, glyph_ids_by_char })
    }

    /// Read a word list with one word per line.
    pub fn from_text(text: &str) -> Result<WordList, LoadError> {
        WordList::new(text.lines())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word(&self, word_id: WordId) -> &Word {
        &self.words[word_id]
    }

    pub fn glyph_id(&self, c: char) -> Option<GlyphId> {
        self.glyph_ids_by_char.get(&c).copied()
    }

    /// Find the id of a word, ignoring case.
    pub fn find(&self, word: &str) -> Option<WordId> {
        let word = word.to_ascii_uppercase();
        self.words.binary_search_by(|candidate| candidate.string.cmp(&word)).ok()
    }
}

#[derive(Debug, Clone)]
enum TrailEntry {
    Removed { slot_id: SlotId, word_id: WordId },
    Replaced { slot_id: SlotId, previous: BitSet },
}

/// The live set of candidate words for each slot.
///
/// While a checkpoint is open, every change is recorded on a trail so that `rewind` can put each
/// domain back exactly the way it was when the checkpoint was taken. Outside of a checkpoint
/// changes are permanent.
#[derive(Debug, Clone)]
pub struct DomainStore {
    domains: Vec<BitSet>,
    trail: Vec<TrailEntry>,
    checkpoints: Vec<usize>,
}

impl DomainStore {
    /// Create a store in which every slot may still take every word.
    pub fn new(slot_count: usize, word_count: usize) -> DomainStore {
        let full: BitSet = (0..word_count).collect();
        DomainStore {
            domains: vec![full; slot_count],
            trail: vec![],
            checkpoints: vec![],
        }
    }

    pub fn domain_of(&self, slot_id: SlotId) -> &BitSet {
        &self.domains[slot_id]
    }

    pub fn remaining_option_count(&self, slot_id: SlotId) -> usize {
        self.domains[slot_id].len()
    }

    pub fn is_exhausted(&self, slot_id: SlotId) -> bool {
        self.domains[slot_id].is_empty()
    }

    /// Remove one candidate. Returns whether it was present.
    pub fn remove(&mut self, slot_id: SlotId, word_id: WordId) -> bool {
        let removed = self.domains[slot_id].remove(word_id);
        if removed && !self.checkpoints.is_empty() {
            self.trail.push(TrailEntry::Removed { slot_id, word_id });
        }
        removed
    }

    /// Replace a slot's candidates wholesale.
    pub fn restore(&mut self, slot_id: SlotId, candidates: BitSet) {
        let previous = std::mem::replace(&mut self.domains[slot_id], candidates);
        if !self.checkpoints.is_empty() {
            self.trail.push(TrailEntry::Replaced { slot_id, previous });
        }
    }

    /// Copy every domain, e.g. for comparing states before and after a search.
    pub fn snapshot(&self) -> Vec<BitSet> {
        self.domains.clone()
    }

    pub fn checkpoint(&mut self) {
        self.checkpoints.push(self.trail.len());
    }

    /// Undo every change made since the most recent checkpoint, and close it.
    pub fn rewind(&mut self) {
        let Some(mark) = self.checkpoints.pop() else {
            return;
        };

        while self.trail.len() > mark {
            match self.trail.pop() {
                Some(TrailEntry::Removed { slot_id, word_id }) => {
                    self.domains[slot_id].insert(word_id);
                }
                Some(TrailEntry::Replaced { slot_id, previous }) => {
                    self.domains[slot_id] = previous;
                }
                None => break,
            }
        }
    }

    /// Close the most recent checkpoint, keeping its changes. They still belong to any enclosing
    /// checkpoint.
    pub fn commit(&mut self) {
        self.checkpoints.pop();
        if self.checkpoints.is_empty() {
            self.trail.clear();
        }
    }
}

/// Settings for a fill attempt.
#[derive(Debug, Clone)]
pub struct FillOptions {
    /// After each tentative choice, re-establish arc consistency among the unfilled slots (and
    /// drop the chosen word from them) before going deeper. All narrowing is undone on backtrack.
    pub inference: bool,

    /// Give up once the fill has been running for this long.
    pub deadline: Option<Duration>,
}

impl Default for FillOptions {
    fn default() -> FillOptions {
        FillOptions { inference: true, deadline: None }
    }
}

/// A struct tracking statistics about the filling process.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub states: u64,
    pub backtracks: u64,
    pub propagation_failures: u64,
    pub duration: Duration,
}

/// A struct representing the results of a fill operation.
#[derive(Debug, Clone)]
pub struct FillSuccess {
    pub assignment: Assignment,
    pub statistics: Statistics,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillFailure {
    #[error("no fill satisfies the grid")]
    NoSolution,
    #[error("gave up after reaching the deadline")]
    DeadlineExceeded,
}

/// The fill engine: a domain store over one puzzle and word list, plus the node consistency,
/// arc consistency and backtracking passes that narrow it.
pub struct Solver<'a> {
    puzzle: &'a Puzzle,
    words: &'a WordList,
    options: FillOptions,
    domains: DomainStore,
    statistics: Statistics,
    start: Instant,
}

impl<'a> Solver<'a> {
    pub fn new(puzzle: &'a Puzzle, words: &'a WordList, options: FillOptions) -> Solver<'a> {
        Solver {
            puzzle,
            words,
            options,
            domains: DomainStore::new(puzzle.slots().len(), words.len()),
            statistics: Statistics::default(),
            start: Instant::now(),
        }
    }

    pub fn domains(&self) -> &DomainStore {
        &self.domains
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Does this word satisfy the slot's unary constraints: the right length, and agreement with
    /// any letters pre-filled in the grid?
    fn fits(&self, slot_id: SlotId, word_id: WordId) -> bool {
        let slot = self.puzzle.slot(slot_id);
        let word = self.words.word(word_id);

        word.len() == slot.length &&
            slot.cell_coords().zip(&word.glyphs).all(|(coord, &glyph)| {
                match self.puzzle.cell(coord) {
                    Cell::Open(Some(letter)) => self.words.glyphs[glyph] == letter,
                    _ => true,
                }
            })
    }

    /// Remove every candidate that violates its slot's unary constraints.
    pub fn enforce_node_consistency(&mut self) {
        for slot_id in 0..self.puzzle.slots().len() {
            let doomed: Vec<WordId> = self.domains.domain_of(slot_id).iter()
                .filter(|&word_id| !self.fits(slot_id, word_id))
                .collect();

            for word_id in doomed {
                self.domains.remove(slot_id, word_id);
            }
        }
    }

    /// Make `x` arc consistent with `y`: remove every candidate for `x` that no candidate for `y`
    /// agrees with at their shared cell. Returns whether anything was removed.
    pub fn revise(&mut self, x: SlotId, y: SlotId) -> bool {
        let Some((x_cell, y_cell)) = self.puzzle.overlap(x, y) else {
            return false;
        };

        // Rather than comparing every pair of words, collect the letters `y` can still place in
        // the shared cell and test each of `x`'s candidates against that set.
        let supported: BitSet = self.domains.domain_of(y).iter()
            .filter_map(|word_id| self.words.word(word_id).glyphs.get(y_cell).copied())
            .collect();

        let doomed: Vec<WordId> = self.domains.domain_of(x).iter()
            .filter(|&word_id| {
                self.words.word(word_id).glyphs.get(x_cell)
                    .map_or(true, |&glyph| !supported.contains(glyph))
            })
            .collect();

        for &word_id in &doomed {
            self.domains.remove(x, word_id);
        }

        if !doomed.is_empty() {
            trace!("revised slot {} against slot {}: removed {} options", x, y, doomed.len());
        }

        !doomed.is_empty()
    }

    /// Every ordered pair of distinct slots that share a cell.
    pub fn all_arcs(&self) -> Vec<Arc> {
        (0..self.puzzle.slots().len())
            .flat_map(|x| self.puzzle.neighbors(x).iter().map(move |&y| (x, y)))
            .collect()
    }

    /// Establish arc consistency with AC-3, starting from `initial_arcs` or, if none are given,
    /// from every arc in the puzzle. Returns false as soon as any slot runs out of candidates.
    pub fn propagate(&mut self, initial_arcs: Option<Vec<Arc>>) -> bool {
        let mut queue: VecDeque<Arc> = match initial_arcs {
            Some(arcs) => arcs.into(),
            None => self.all_arcs().into(),
        };

        while let Some((x, y)) = queue.pop_front() {
            if !self.revise(x, y) {
                continue;
            }

            if self.domains.is_exhausted(x) {
                debug!("arc consistency emptied slot {} ({:?})", x, self.puzzle.slot(x));
                return false;
            }

            // `x` lost options, so its other neighbors may have lost support.
            for &k in self.puzzle.neighbors(x) {
                if k != y {
                    queue.push_back((k, x));
                }
            }
        }

        true
    }

    /// Check an assignment against every constraint: words are distinct, fit their slots, and agree
    /// wherever two slots cross.
    pub fn is_consistent(&self, assignment: &Assignment) -> bool {
        let mut used: HashSet<WordId> = HashSet::with_capacity(assignment.len());
        for (&slot_id, &word_id) in assignment {
            if !used.insert(word_id) || !self.fits(slot_id, word_id) {
                return false;
            }
        }

        assignment.iter().all(|(&a, &word_a)| {
            assignment.range(a + 1..).all(|(&b, &word_b)| {
                match self.puzzle.overlap(a, b) {
                    Some((cell_a, cell_b)) => {
                        self.words.word(word_a).glyphs[cell_a] == self.words.word(word_b).glyphs[cell_b]
                    }
                    None => true,
                }
            })
        })
    }

    /// Choose the unfilled slot with the fewest remaining options, preferring slots with more
    /// neighbors, then lower ids. Returns None once every slot is filled.
    pub fn select_unassigned_slot(&self, assignment: &Assignment) -> Option<SlotId> {
        (0..self.puzzle.slots().len())
            .filter(|slot_id| !assignment.contains_key(slot_id))
            .min_by_key(|&slot_id| {
                (
                    self.domains.remaining_option_count(slot_id),
                    Reverse(self.puzzle.neighbors(slot_id).len()),
                    slot_id,
                )
            })
    }

    /// How many of a slot's candidates place each glyph in the given cell.
    fn glyph_counts(&self, slot_id: SlotId, cell_idx: usize) -> Vec<usize> {
        let mut counts = vec![0; self.words.glyphs.len()];
        for word_id in self.domains.domain_of(slot_id).iter() {
            if let Some(&glyph) = self.words.word(word_id).glyphs.get(cell_idx) {
                counts[glyph] += 1;
            }
        }
        counts
    }

    /// Return the candidates for a slot ordered by how many options each one would rule out among
    /// the unfilled neighbors, fewest first. Ties keep word list order.
    pub fn order_domain_values(&self, slot_id: SlotId, assignment: &Assignment) -> Vec<WordId> {
        let crossings: Vec<(usize, usize, Vec<usize>)> = self.puzzle.neighbors(slot_id).iter()
            .filter(|&&neighbor_id| !assignment.contains_key(&neighbor_id))
            .filter_map(|&neighbor_id| {
                let (cell_idx, other_cell_idx) = self.puzzle.overlap(slot_id, neighbor_id)?;
                Some((
                    cell_idx,
                    self.domains.remaining_option_count(neighbor_id),
                    self.glyph_counts(neighbor_id, other_cell_idx),
                ))
            })
            .collect();

        let mut options: Vec<(usize, WordId)> = self.domains.domain_of(slot_id).iter()
            .map(|word_id| {
                let glyphs = &self.words.word(word_id).glyphs;
                let eliminated = crossings.iter()
                    .map(|(cell_idx, option_count, counts)| {
                        option_count - glyphs.get(*cell_idx).map_or(0, |&glyph| counts[glyph])
                    })
                    .sum::<usize>();
                (eliminated, word_id)
            })
            .collect();

        options.sort_unstable();
        options.into_iter().map(|(_, word_id)| word_id).collect()
    }

    /// Narrow the domains to reflect a tentative choice: the slot keeps only the chosen word, the
    /// word is dropped from other unfilled slots, and arc consistency is re-established. Returns
    /// false if some slot runs out of options.
    fn infer(&mut self, slot_id: SlotId, word_id: WordId, assignment: &Assignment) -> bool {
        self.domains.restore(slot_id, std::iter::once(word_id).collect());

        let mut arcs: Vec<Arc> = self.puzzle.neighbors(slot_id).iter()
            .filter(|&&neighbor_id| !assignment.contains_key(&neighbor_id))
            .map(|&neighbor_id| (neighbor_id, slot_id))
            .collect();

        for other_id in 0..self.puzzle.slots().len() {
            if assignment.contains_key(&other_id) || !self.domains.remove(other_id, word_id) {
                continue;
            }
            if self.domains.is_exhausted(other_id) {
                return false;
            }
            arcs.extend(self.puzzle.neighbors(other_id).iter().map(|&k| (k, other_id)));
        }

        self.propagate(Some(arcs))
    }

    fn check_deadline(&self) -> Result<(), FillFailure> {
        match self.options.deadline {
            Some(deadline) if self.start.elapsed() >= deadline => Err(FillFailure::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Extend `assignment` depth-first until it covers every slot. Returns `Ok(true)` with the
    /// assignment complete, or `Ok(false)` with the assignment and every domain exactly as they
    /// were on entry.
    pub fn backtrack(&mut self, assignment: &mut Assignment) -> Result<bool, FillFailure> {
        let Some(slot_id) = self.select_unassigned_slot(assignment) else {
            return Ok(true);
        };

        self.check_deadline()?;
        self.statistics.states += 1;

        for word_id in self.order_domain_values(slot_id, assignment) {
            assignment.insert(slot_id, word_id);

            if self.is_consistent(assignment) {
                trace!("trying {} in slot {}", self.words.word(word_id).string, slot_id);

                self.domains.checkpoint();
                let viable = !self.options.inference || self.infer(slot_id, word_id, assignment);
                if !viable {
                    self.statistics.propagation_failures += 1;
                }

                if viable && self.backtrack(assignment)? {
                    self.domains.commit();
                    return Ok(true);
                }
                self.domains.rewind();
            }

            assignment.remove(&slot_id);
            self.statistics.backtracks += 1;
        }

        Ok(false)
    }

    /// Enforce node and arc consistency, then search for a complete fill.
    pub fn solve(&mut self) -> Result<FillSuccess, FillFailure> {
        self.start = Instant::now();

        self.enforce_node_consistency();
        if let Some(slot_id) = (0..self.puzzle.slots().len()).find(|&id| self.domains.is_exhausted(id)) {
            info!("no word fits slot {:?}", self.puzzle.slot(slot_id));
            return Err(FillFailure::NoSolution);
        }

        if !self.propagate(None) {
            self.statistics.propagation_failures += 1;
            info!("grid is not arc consistent with the word list");
            return Err(FillFailure::NoSolution);
        }

        let mut assignment = Assignment::new();
        let filled = self.backtrack(&mut assignment)?;
        self.statistics.duration = self.start.elapsed();

        info!(
            "search {} after {} states and {} backtracks in {:?}",
            if filled { "succeeded" } else { "failed" },
            self.statistics.states,
            self.statistics.backtracks,
            self.statistics.duration,
        );

        if filled {
            Ok(FillSuccess { assignment, statistics: self.statistics.clone() })
        } else {
            Err(FillFailure::NoSolution)
        }
    }
}

/// Search for a valid fill for the given puzzle with the default options.
pub fn find_fill(puzzle: &Puzzle, words: &WordList) -> Result<FillSuccess, FillFailure> {
    find_fill_with_options(puzzle, words, &FillOptions::default())
}

pub fn find_fill_with_options(
    puzzle: &Puzzle,
    words: &WordList,
    options: &FillOptions,
) -> Result<FillSuccess, FillFailure> {
    Solver::new(puzzle, words, options.clone()).solve()
}

/// Map every cell to its letter under the given assignment. Blocks and unfilled open cells are
/// `None`, except that pre-filled letters always show.
pub fn letter_grid(puzzle: &Puzzle, words: &WordList, assignment: &Assignment) -> Vec<Vec<Option<char>>> {
    let mut letters: Vec<Vec<Option<char>>> = (0..puzzle.height())
        .map(|row| (0..puzzle.width()).map(|col| match puzzle.cell((row, col)) {
            Cell::Open(letter) => letter,
            Cell::Block => None,
        }).collect())
        .collect();

    for (&slot_id, &word_id) in assignment {
        let slot = puzzle.slot(slot_id);
        for ((row, col), &glyph) in slot.cell_coords().zip(&words.word(word_id).glyphs) {
            letters[row][col] = Some(words.glyphs[glyph]);
        }
    }

    letters
}

/// Turn the given puzzle and assignment into a rendered string, one line per row.
pub fn render_grid(puzzle: &Puzzle, words: &WordList, assignment: &Assignment) -> String {
    let letters = letter_grid(puzzle, words, assignment);

    letters.iter().enumerate().map(|(row, line)| {
        line.iter().enumerate().map(|(col, letter)| match puzzle.cell((row, col)) {
            Cell::Block => '█',
            Cell::Open(_) => letter.unwrap_or(' '),
        }).collect::<String>()
    }).collect::<Vec<_>>().join("\n")
}
