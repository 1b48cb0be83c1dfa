//! Schema-checked tabular structure with CSV input and output.
//!
//! A [`Table`] is an ordered set of uniquely named columns of equal length.
//! Each column is either numeric or categorical; both may hold missing cells.

use std::collections::{BTreeMap, HashSet};

use diagflow_shared::{DiagflowError, Result};
use ndarray::Array2;
use tracing::debug;

use crate::schema::{Label, require_column};

/// Cell values treated as missing when reading CSV.
const MISSING_MARKERS: [&str; 7] = ["", "NA", "NaN", "nan", "null", "NULL", "None"];

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim())
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// Typed cell storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    /// Numeric column without missing cells.
    pub fn dense(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::numeric(name, values.into_iter().map(Some).collect())
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }

    /// Categorical label column built from diagnosis labels.
    pub fn labels(name: impl Into<String>, labels: &[Label]) -> Self {
        Self::categorical(
            name,
            labels.iter().map(|l| Some(l.as_str().to_string())).collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.data, ColumnData::Numeric(_))
    }

    pub fn missing_count(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Categorical(v) => v.iter().filter(|c| c.is_none()).count(),
        }
    }

    /// Numeric cells holding `inf`, `-inf` or an overflowed literal.
    pub fn non_finite_count(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.iter().flatten().filter(|x| !x.is_finite()).count(),
            ColumnData::Categorical(_) => 0,
        }
    }

    /// Cell `row` rendered the way it is written to CSV.
    fn render(&self, row: usize) -> String {
        match &self.data {
            ColumnData::Numeric(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Categorical(v) => v[row].clone().unwrap_or_default(),
        }
    }

    fn select(&self, rows: &[usize]) -> Self {
        let data = match &self.data {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(rows.iter().map(|&r| v[r].clone()).collect())
            }
        };
        Self {
            name: self.name.clone(),
            data,
        }
    }

    /// Infer the column type from raw CSV cells.
    fn from_cells(name: String, cells: Vec<String>) -> Self {
        let parsed: Option<Vec<Option<f64>>> = cells
            .iter()
            .map(|c| {
                if is_missing(c) {
                    Some(None)
                } else {
                    c.trim().parse::<f64>().ok().map(Some)
                }
            })
            .collect();

        match parsed {
            Some(values) => Self::numeric(name, values),
            None => Self::categorical(
                name,
                cells
                    .into_iter()
                    .map(|c| if is_missing(&c) { None } else { Some(c) })
                    .collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Ordered collection of equally sized, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build a table, validating column lengths and name uniqueness.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != n_rows) {
            return Err(DiagflowError::schema(format!(
                "column '{}' has {} rows, expected {n_rows}",
                bad.name(),
                bad.len()
            )));
        }
        check_unique(columns.iter().map(Column::name))?;
        Ok(Self { columns, n_rows })
    }

    /// Parse CSV bytes. Headerless input gets positional names `0..n-1`.
    pub fn from_csv(bytes: &[u8], has_headers: bool) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .from_reader(bytes);

        let mut names: Vec<String> = if has_headers {
            reader
                .headers()
                .map_err(csv_error)?
                .iter()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            if names.is_empty() && cells.is_empty() {
                names = (0..record.len()).map(|i| i.to_string()).collect();
                cells = vec![Vec::new(); record.len()];
            }
            if record.len() != names.len() {
                return Err(DiagflowError::schema(format!(
                    "malformed CSV: row has {} fields, expected {}",
                    record.len(),
                    names.len()
                )));
            }
            for (column, value) in cells.iter_mut().zip(record.iter()) {
                column.push(value.to_string());
            }
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::from_cells(name, values))
            .collect();
        let table = Self::new(columns)?;
        debug!(rows = table.n_rows, columns = table.n_cols(), "parsed CSV");
        Ok(table)
    }

    /// Serialize as CSV with a header row.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(self.columns.iter().map(Column::name))
            .map_err(csv_error)?;
        for row in 0..self.n_rows {
            writer
                .write_record(self.columns.iter().map(|c| c.render(row)))
                .map_err(csv_error)?;
        }
        writer
            .into_inner()
            .map_err(|e| DiagflowError::Serialization(format!("CSV flush failed: {e}")))
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name() == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Remove a column, returning it if present.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let pos = self.columns.iter().position(|c| c.name() == name)?;
        let column = self.columns.remove(pos);
        if self.columns.is_empty() {
            self.n_rows = 0;
        }
        Some(column)
    }

    /// Rename every column through `f`; fails if two names collide.
    pub fn rename_columns(&mut self, f: impl Fn(&str) -> String) -> Result<()> {
        let renamed: Vec<String> = self.columns.iter().map(|c| f(c.name())).collect();
        check_unique(renamed.iter().map(String::as_str))?;
        for (column, name) in self.columns.iter_mut().zip(renamed) {
            column.name = name;
        }
        Ok(())
    }

    /// Append a column of matching length with a fresh name.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.n_rows {
            return Err(DiagflowError::schema(format!(
                "column '{}' has {} rows, expected {}",
                column.name(),
                column.len(),
                self.n_rows
            )));
        }
        if self.has_column(column.name()) {
            return Err(DiagflowError::schema(format!(
                "duplicate column '{}'",
                column.name()
            )));
        }
        if self.columns.is_empty() {
            self.n_rows = column.len();
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replace an existing column's data in place, keeping its position.
    pub fn replace_column(&mut self, column: Column) -> Result<()> {
        if column.len() != self.n_rows {
            return Err(DiagflowError::schema(format!(
                "column '{}' has {} rows, expected {}",
                column.name(),
                column.len(),
                self.n_rows
            )));
        }
        let slot = self
            .columns
            .iter_mut()
            .find(|c| c.name() == column.name())
            .ok_or_else(|| {
                DiagflowError::schema(format!("expected column '{}' is missing", column.name()))
            })?;
        *slot = column;
        Ok(())
    }

    /// New table holding only `rows`, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.n_rows) {
            return Err(DiagflowError::schema(format!(
                "row index {bad} out of range for {} rows",
                self.n_rows
            )));
        }
        Ok(Self {
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            n_rows: rows.len(),
        })
    }

    /// New table holding only the named columns, in the given order.
    pub fn select_columns(&self, names: &[&str]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            require_column(self, name)?;
            if let Some(column) = self.column(name) {
                columns.push(column.clone());
            }
        }
        Self::new(columns)
    }

    /// Missing cells across the named columns.
    pub fn missing_count(&self, names: &[&str]) -> usize {
        names
            .iter()
            .filter_map(|n| self.column(n))
            .map(Column::missing_count)
            .sum()
    }

    /// Non-finite numeric cells across the named columns.
    pub fn non_finite_count(&self, names: &[&str]) -> usize {
        names
            .iter()
            .filter_map(|n| self.column(n))
            .map(Column::non_finite_count)
            .sum()
    }

    /// Dense `rows x names.len()` matrix over the named columns.
    ///
    /// Fails with `SchemaError` for an absent column and `DataQualityError`
    /// for a non-numeric column, a missing cell or a non-finite value.
    pub fn feature_matrix(&self, names: &[&str]) -> Result<Array2<f64>> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            require_column(self, name)?;
            match self.column(name).map(Column::data) {
                Some(ColumnData::Numeric(values)) => columns.push(values),
                _ => {
                    return Err(DiagflowError::data_quality(format!(
                        "column '{name}' contains non-numeric values"
                    )));
                }
            }
        }

        let missing = self.missing_count(names);
        if missing > 0 {
            return Err(DiagflowError::data_quality(format!(
                "found {missing} missing values in feature columns"
            )));
        }
        let non_finite = self.non_finite_count(names);
        if non_finite > 0 {
            return Err(DiagflowError::data_quality(format!(
                "found {non_finite} non-finite values in feature columns"
            )));
        }

        Ok(Array2::from_shape_fn((self.n_rows, columns.len()), |(row, col)| {
            columns[col][row].unwrap_or(f64::NAN)
        }))
    }

    /// Parse the named categorical column as diagnosis labels.
    pub fn labels(&self, name: &str) -> Result<Vec<Label>> {
        require_column(self, name)?;
        let cells: Vec<Option<String>> = match self.column(name).map(Column::data) {
            Some(ColumnData::Categorical(values)) => values.clone(),
            Some(ColumnData::Numeric(values)) => {
                values.iter().map(|v| v.map(|x| x.to_string())).collect()
            }
            None => Vec::new(),
        };

        let mut labels = Vec::with_capacity(cells.len());
        let mut invalid = 0usize;
        let mut example: Option<String> = None;
        for cell in &cells {
            match cell.as_deref().and_then(Label::parse) {
                Some(label) => labels.push(label),
                None => {
                    invalid += 1;
                    example.get_or_insert_with(|| cell.clone().unwrap_or_else(|| "<missing>".into()));
                }
            }
        }

        if invalid > 0 {
            return Err(DiagflowError::data_quality(format!(
                "column '{name}' has {invalid} values that are not 'B' or 'M' (e.g. {})",
                example.unwrap_or_default()
            )));
        }
        Ok(labels)
    }

    /// Occurrences of each rendered value in a column, most frequent first.
    pub fn value_counts(&self, name: &str) -> Vec<(String, usize)> {
        let Some(column) = self.column(name) else {
            return Vec::new();
        };
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for row in 0..self.n_rows {
            *counts.entry(column.render(row)).or_default() += 1;
        }
        let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DiagflowError::schema(format!("duplicate column '{name}'")));
        }
    }
    Ok(())
}

fn csv_error(e: csv::Error) -> DiagflowError {
    DiagflowError::schema(format!("malformed CSV: {e}"))
}
