//! Numbered menus: choice tables, their console layout and the prompt loop.
//!
//! Every selection the tool asks for (architecture, country, mirror, image)
//! goes through a [`ChoiceTable`], which numbers the options from 1, and a
//! [`Prompter`], which keeps asking until the answer is one of those numbers.
use crate::error::{GensystemError, Result};
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Padding added to the widest entry when laying out columns.
const COLUMN_PADDING: usize = 3;

/// Menus with at least this many entries are printed in three columns.
const THREE_COLUMN_THRESHOLD: usize = 10;

/// A 1-indexed numbering of unique option names.
///
/// Ranks always form the contiguous range `1..=len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceTable {
    names: Vec<String>,
}

impl ChoiceTable {
    /// Builds a table from `items` sorted by name. Duplicates are dropped.
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = items.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    /// Builds a table keeping the order of `items`. Later duplicates are dropped.
    pub fn unsorted<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for item in items {
            let item = item.into();
            if !names.contains(&item) {
                names.push(item);
            }
        }
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name).map(|i| i + 1)
    }

    pub fn name_of(&self, rank: usize) -> Option<&str> {
        rank.checked_sub(1)
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Iterates `(rank, name)` pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (i + 1, name.as_str()))
    }

    /// Resolves a raw answer typed by the user to the chosen name.
    pub fn parse_choice(&self, answer: &str) -> Result<&str> {
        let answer = answer.trim();
        answer
            .parse::<usize>()
            .ok()
            .and_then(|rank| self.name_of(rank))
            .ok_or_else(|| GensystemError::InvalidUserChoice(answer.to_string()))
    }
}

/// Formats a rank as `[n]`, right-aligned to the width of the largest rank.
///
/// With ten or more choices the single digit ranks become `[ 1]` so the
/// names line up.
pub fn format_choice(rank: usize, total: usize) -> String {
    let width = total.max(1).to_string().len();
    format!("[{rank:>width$}]")
}

/// How a menu is laid out on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    SingleColumn,
    ThreeColumns,
}

impl Layout {
    pub fn for_len(len: usize) -> Self {
        if len >= THREE_COLUMN_THRESHOLD {
            Layout::ThreeColumns
        } else {
            Layout::SingleColumn
        }
    }
}

fn entries(table: &ChoiceTable) -> Vec<String> {
    table
        .iter()
        .map(|(rank, name)| format!("{} {}", format_choice(rank, table.len()), name))
        .collect()
}

/// Splits the rendered entries into three columns of `ceil(N/3)` rows each,
/// column-major, padding the tail with empty placeholders.
pub fn columns(table: &ChoiceTable) -> Vec<Vec<String>> {
    let mut cells = entries(table);
    if cells.is_empty() {
        return Vec::new();
    }
    let rows = cells.len().div_ceil(3);
    cells.resize(rows * 3, String::new());
    cells.chunks(rows).map(<[String]>::to_vec).collect()
}

/// Renders `table` with the given layout. Empty tables render as "".
pub fn render(table: &ChoiceTable, layout: Layout) -> String {
    match layout {
        Layout::SingleColumn => entries(table)
            .into_iter()
            .map(|line| line + "\n")
            .collect(),
        Layout::ThreeColumns => render_three_columns(table),
    }
}

fn render_three_columns(table: &ChoiceTable) -> String {
    let columns = columns(table);
    let Some(rows) = columns.first().map(Vec::len) else {
        return String::new();
    };
    let width = columns
        .iter()
        .flatten()
        .map(|cell| cell.chars().count())
        .max()
        .unwrap_or(0)
        + COLUMN_PADDING;

    let mut out = String::new();
    for row in 0..rows {
        let line: String = columns
            .iter()
            .map(|column| format!("{:<width$}", column[row]))
            .collect();
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Asks numbered questions on a line based input and writes menus to an output.
///
/// Generic over the streams so tests can script the answers.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints a heading followed by the menu in the layout its size calls for.
    pub fn show(&mut self, heading: &str, table: &ChoiceTable) -> Result<()> {
        writeln!(self.output, "\n{heading}")?;
        write!(self.output, "{}", render(table, Layout::for_len(table.len())))?;
        self.output.flush()?;
        Ok(())
    }

    /// Prompts until the answer is a listed rank and returns the chosen name.
    ///
    /// # Errors
    ///
    /// Returns [`GensystemError::InputClosed`] if the input ends first, or
    /// an IO error from the underlying streams.
    pub fn choose<'t>(&mut self, prompt: &str, table: &'t ChoiceTable) -> Result<&'t str> {
        if table.is_empty() {
            return Err(GensystemError::InvalidUserChoice(
                "nothing to choose from".to_string(),
            ));
        }
        loop {
            write!(self.output, "{prompt}")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(GensystemError::InputClosed);
            }
            match table.parse_choice(&line) {
                Ok(name) => return Ok(name),
                Err(e) => debug!(error = %e, "re-prompting"),
            }
        }
    }

    /// [`show`](Self::show) followed by [`choose`](Self::choose).
    pub fn select<'t>(
        &mut self,
        heading: &str,
        prompt: &str,
        table: &'t ChoiceTable,
    ) -> Result<&'t str> {
        self.show(heading, table)?;
        self.choose(prompt, table)
    }

    /// Writes a free-form line to the prompt output.
    pub fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{message}")?;
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("option-{i:03}")).collect()
    }

    #[test]
    fn test_ranks_are_contiguous() {
        for n in [0, 1, 2, 9, 10, 31] {
            let table = ChoiceTable::new(names(n));
            let mut ranks: Vec<usize> = table.iter().map(|(rank, _)| rank).collect();
            ranks.sort();
            assert_eq!(ranks, (1..=n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_table_is_sorted_and_deduplicated() {
        let table = ChoiceTable::new(["USA", "Canada", "USA", "Brazil"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rank_of("Brazil"), Some(1));
        assert_eq!(table.rank_of("USA"), Some(3));
        assert_eq!(table.name_of(2), Some("Canada"));
        assert_eq!(table.name_of(0), None);
        assert_eq!(table.name_of(4), None);
    }

    #[test]
    fn test_unsorted_keeps_order() {
        let table = ChoiceTable::unsorted(["stage3", "minimal", "stage3"]);
        assert_eq!(table.rank_of("stage3"), Some(1));
        assert_eq!(table.rank_of("minimal"), Some(2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_parse_choice() {
        let table = ChoiceTable::new(["a", "b"]);
        assert_eq!(table.parse_choice(" 2\n").unwrap(), "b");
        assert!(table.parse_choice("3").is_err());
        assert!(table.parse_choice("0").is_err());
        assert!(table.parse_choice("b").is_err());
        assert!(table.parse_choice("-1").is_err());
    }

    #[test]
    fn test_numbering_width() {
        assert_eq!(format_choice(3, 9), "[3]");
        assert_eq!(format_choice(3, 10), "[ 3]");
        assert_eq!(format_choice(10, 10), "[10]");

        let small = render(&ChoiceTable::new(names(9)), Layout::SingleColumn);
        assert!(small.lines().all(|l| l.starts_with("[") && l.as_bytes()[2] == b']'));

        let large = render(&ChoiceTable::new(names(12)), Layout::SingleColumn);
        assert!(large.lines().all(|l| l.as_bytes()[3] == b']'));
        assert!(large.starts_with("[ 1] option-000"));
    }

    #[test]
    fn test_three_columns_are_column_major() {
        for n in [1, 2, 3, 4, 7, 10, 31] {
            let table = ChoiceTable::new(names(n));
            let cols = columns(&table);
            assert_eq!(cols.len(), 3);
            let rows = n.div_ceil(3);
            assert!(cols.iter().all(|c| c.len() == rows));

            let flattened: Vec<String> = cols
                .into_iter()
                .flatten()
                .filter(|cell| !cell.is_empty())
                .collect();
            assert_eq!(flattened, entries(&table));
        }
    }

    #[test]
    fn test_three_column_rendering_aligns() {
        let table = ChoiceTable::new(["Austria", "Brazil", "Canada", "Denmark", "USA"]);
        let rendered = render(&table, Layout::ThreeColumns);
        let lines: Vec<&str> = rendered.lines().collect();

        // widest entry "[4] Denmark" is 11 chars, plus 3 padding
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "[1] Austria   [3] Canada    [5] USA");
        assert_eq!(lines[1], "[2] Brazil    [4] Denmark");
    }

    #[test]
    fn test_empty_table_renders_nothing() {
        let table = ChoiceTable::new(Vec::<String>::new());
        assert_eq!(render(&table, Layout::SingleColumn), "");
        assert_eq!(render(&table, Layout::ThreeColumns), "");
        assert!(columns(&table).is_empty());
    }

    #[test]
    fn test_layout_threshold() {
        assert_eq!(Layout::for_len(9), Layout::SingleColumn);
        assert_eq!(Layout::for_len(10), Layout::ThreeColumns);
    }

    #[test]
    fn test_prompter_reprompts_until_valid() {
        let table = ChoiceTable::new(["amd64", "arm64", "x86"]);
        let input = Cursor::new("foo\n7\n\n2\n");
        let mut prompter = Prompter::new(input, Vec::new());

        let choice = prompter.select("ARCHITECTURES", "SELECT: ", &table).unwrap();
        assert_eq!(choice, "arm64");

        let output = String::from_utf8(prompter.into_output()).unwrap();
        assert_eq!(output.matches("SELECT: ").count(), 4);
        assert!(output.contains("[3] x86"));
    }

    #[test]
    fn test_prompter_reports_closed_input() {
        let table = ChoiceTable::new(["amd64"]);
        let mut prompter = Prompter::new(Cursor::new("9\n"), Vec::new());
        let err = prompter.choose("SELECT: ", &table).unwrap_err();
        assert!(matches!(err, GensystemError::InputClosed));
    }
}
