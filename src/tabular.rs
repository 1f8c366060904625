//! Tabular data loading and preprocessing
//!
//! A [`Table`] is a small in-memory frame of named numeric columns, enough
//! for the admissions-style workflow: read a headered CSV, one-hot encode a
//! categorical column, scale features into [0, 1], and split into train and
//! test sets.

use std::{fs, path::Path};

use rand::{Rng, seq::SliceRandom};
use thiserror::Error;

/// Errors for table loading and preprocessing
#[derive(Debug, Error)]
pub enum TableError {
    #[error("table io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table has no rows")]
    Empty,
    #[error("row on line {line} has {got} fields, expected {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("could not parse field '{field}' on line {line} as a number")]
    ParseField { line: usize, field: String },
    #[error("unknown column '{name}'")]
    UnknownColumn { name: String },
}

/// A frame of named numeric columns with row-major storage
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<f32>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f32>>) -> Result<Self, TableError> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    line: i + 1,
                    expected: columns.len(),
                    got: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Reads a comma-separated file with a header row. Fields must all be
    /// numeric; there is no quoting or escaping.
    pub fn read_csv(path: &Path) -> Result<Self, TableError> {
        let text = fs::read_to_string(path)?;
        let table = Self::parse_csv(&text)?;
        log::info!(
            "read {} rows x {} columns from '{}'",
            table.n_rows(),
            table.n_columns(),
            path.display()
        );
        Ok(table)
    }

    pub fn parse_csv(text: &str) -> Result<Self, TableError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());
        let (_, header) = lines.next().ok_or(TableError::Empty)?;
        let columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();

        let mut rows = Vec::new();
        for (line_idx, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    line: line_idx + 1,
                    expected: columns.len(),
                    got: fields.len(),
                });
            }
            let row = fields
                .iter()
                .map(|f| {
                    f.parse::<f32>().map_err(|_| TableError::ParseField {
                        line: line_idx + 1,
                        field: f.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(TableError::Empty);
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::UnknownColumn { name: name.into() })
    }

    /// Copies out a single column by name
    pub fn column(&self, name: &str) -> Result<Vec<f32>, TableError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Replaces a categorical, integer-valued column with one indicator
    /// column per distinct value, named `{column}_{value}` and appended at
    /// the end of the frame (like pandas get_dummies followed by a drop)
    pub fn one_hot(&self, name: &str) -> Result<Table, TableError> {
        let idx = self.column_index(name)?;
        let mut values: Vec<i64> = self.rows.iter().map(|r| r[idx].round() as i64).collect();
        let categories = {
            values.sort_unstable();
            values.dedup();
            values
        };

        let mut columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != idx)
            .map(|(_, c)| c.clone())
            .collect();
        columns.extend(categories.iter().map(|v| format!("{name}_{v}")));

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut new_row: Vec<f32> = row
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != idx)
                    .map(|(_, v)| *v)
                    .collect();
                let value = row[idx].round() as i64;
                new_row.extend(
                    categories
                        .iter()
                        .map(|c| if *c == value { 1.0 } else { 0.0 }),
                );
                new_row
            })
            .collect();

        Ok(Table {
            columns,
            rows,
        })
    }

    /// Scales a column in place to [0, 1] via `(x - min) / (max - min)`.
    /// A constant column maps to 0.0.
    pub fn min_max_scale(&mut self, name: &str) -> Result<(), TableError> {
        let idx = self.column_index(name)?;
        let min = self
            .rows
            .iter()
            .map(|r| r[idx])
            .fold(f32::INFINITY, f32::min);
        let max = self
            .rows
            .iter()
            .map(|r| r[idx])
            .fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;
        for row in self.rows.iter_mut() {
            row[idx] = if range == 0.0 {
                0.0
            } else {
                (row[idx] - min) / range
            };
        }
        Ok(())
    }

    /// Splits rows into (train, test) with `test_frac` of the rows in the
    /// test set, shuffled. No rows are lost.
    pub fn train_test_split<R: Rng>(self, test_frac: f32, rng: &mut R) -> (Table, Table) {
        let mut indices: Vec<usize> = (0..self.rows.len()).collect();
        indices.shuffle(rng);
        let n_test = ((self.rows.len() as f32) * test_frac).round() as usize;
        let (test_idx, train_idx) = indices.split_at(n_test.min(indices.len()));

        let pick = |idxs: &[usize]| -> Vec<Vec<f32>> {
            idxs.iter().map(|&i| self.rows[i].clone()).collect()
        };
        let train = Table {
            columns: self.columns.clone(),
            rows: pick(train_idx),
        };
        let test = Table {
            columns: self.columns.clone(),
            rows: pick(test_idx),
        };
        (train, test)
    }

    /// Splits the frame into a feature matrix (all columns except the
    /// target) and the target vector
    pub fn features_and_targets(
        &self,
        target: &str,
    ) -> Result<(Vec<Vec<f32>>, Vec<f32>), TableError> {
        let idx = self.column_index(target)?;
        let features = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|&(i, _)| i != idx)
                    .map(|(_, v)| *v)
                    .collect()
            })
            .collect();
        let targets = self.rows.iter().map(|r| r[idx]).collect();
        Ok((features, targets))
    }
}

/// Generates a table in the shape of the student admissions dataset
/// (gre, gpa, rank, admit) with admissions correlated to the features,
/// so the demo and tests run without a CSV on disk
pub fn synthetic_admissions<R: Rng>(n: usize, rng: &mut R) -> Table {
    let columns = vec![
        "admit".to_string(),
        "gre".to_string(),
        "gpa".to_string(),
        "rank".to_string(),
    ];
    let rows = (0..n)
        .map(|_| {
            let gre = (rng.random_range(260..=800) / 20 * 20) as f32;
            let gpa = rng.random_range(2.0f32..4.0);
            let rank = rng.random_range(1..=4) as f32;
            let logit = 0.006 * (gre - 520.0) + 1.2 * (gpa - 3.0) - 0.6 * (rank - 2.0);
            let p = 1.0 / (1.0 + (-logit).exp());
            let admit = if rng.random_bool(p.clamp(0.02, 0.98) as f64) {
                1.0
            } else {
                0.0
            };
            vec![admit, gre, gpa, rank]
        })
        .collect();
    Table { columns, rows }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;

    const CSV: &str = "admit,gre,gpa,rank\n\
                       0,380,3.61,3\n\
                       1,660,3.67,3\n\
                       1,800,4.0,1\n\
                       0,640,3.19,4\n";

    #[test]
    fn test_parse_csv() {
        let table = Table::parse_csv(CSV).unwrap();
        assert_eq!(table.columns(), &["admit", "gre", "gpa", "rank"]);
        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.column("gre").unwrap(), vec![380.0, 660.0, 800.0, 640.0]);
    }

    #[test]
    fn test_parse_csv_errors() {
        assert!(matches!(Table::parse_csv(""), Err(TableError::Empty)));
        assert!(matches!(
            Table::parse_csv("a,b\n"),
            Err(TableError::Empty)
        ));

        let ragged = "a,b\n1.0,2.0,3.0\n";
        assert!(matches!(
            Table::parse_csv(ragged),
            Err(TableError::RaggedRow {
                line: 2,
                expected: 2,
                got: 3
            })
        ));

        let bad_field = "a,b\n1.0,x\n";
        assert!(matches!(
            Table::parse_csv(bad_field),
            Err(TableError::ParseField { line: 2, field }) if field == "x"
        ));
    }

    #[test]
    fn test_unknown_column() {
        let table = Table::parse_csv(CSV).unwrap();
        assert!(matches!(
            table.column("nope"),
            Err(TableError::UnknownColumn { name }) if name == "nope"
        ));
    }

    #[test]
    fn test_one_hot() {
        let table = Table::parse_csv(CSV).unwrap();
        let encoded = table.one_hot("rank").unwrap();
        assert_eq!(
            encoded.columns(),
            &["admit", "gre", "gpa", "rank_1", "rank_3", "rank_4"]
        );
        // first row has rank 3
        assert_eq!(encoded.rows()[0][3..], [0.0, 1.0, 0.0]);
        // third row has rank 1
        assert_eq!(encoded.rows()[2][3..], [1.0, 0.0, 0.0]);
        // each row has exactly one indicator set
        for row in encoded.rows() {
            let total: f32 = row[3..].iter().sum();
            assert_eq!(total, 1.0);
        }
    }

    #[test]
    fn test_min_max_scale() {
        let mut table = Table::parse_csv(CSV).unwrap();
        table.min_max_scale("gre").unwrap();
        let gre = table.column("gre").unwrap();
        assert_eq!(gre[0], 0.0); // 380 is the min
        assert_eq!(gre[2], 1.0); // 800 is the max
        assert!(gre.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_min_max_scale_constant_column() {
        let mut table = Table::new(
            vec!["x".into()],
            vec![vec![5.0], vec![5.0]],
        )
        .unwrap();
        table.min_max_scale("x").unwrap();
        assert_eq!(table.column("x").unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_train_test_split() {
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        let table = synthetic_admissions(100, &mut rng);
        let (train, test) = table.train_test_split(0.2, &mut rng);
        assert_eq!(test.n_rows(), 20);
        assert_eq!(train.n_rows(), 80);
        assert_eq!(train.columns(), test.columns());
    }

    #[test]
    fn test_features_and_targets() {
        let table = Table::parse_csv(CSV).unwrap();
        let (features, targets) = table.features_and_targets("admit").unwrap();
        assert_eq!(features.len(), 4);
        assert_eq!(features[0], vec![380.0, 3.61, 3.0]);
        assert_eq!(targets, vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_synthetic_admissions_shape() {
        let mut rng = Pcg64Mcg::seed_from_u64(3);
        let table = synthetic_admissions(50, &mut rng);
        assert_eq!(table.n_rows(), 50);
        assert_eq!(table.columns(), &["admit", "gre", "gpa", "rank"]);
        for row in table.rows() {
            assert!(row[0] == 0.0 || row[0] == 1.0);
            assert!((260.0..=800.0).contains(&row[1]));
            assert!((2.0..=4.0).contains(&row[2]));
            assert!((1.0..=4.0).contains(&row[3]));
        }
    }
}
