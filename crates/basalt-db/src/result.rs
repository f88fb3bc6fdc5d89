use basalt_document::FieldBuffer;

/// The materialized outcome of one statement: result documents for reads
/// (and RETURNING clauses), plus the number of environments that reached
/// the end of the pipeline.
#[derive(Debug, Default)]
pub struct ResultSet {
    rows: Vec<FieldBuffer>,
    rows_affected: u64,
}

impl ResultSet {
    pub(crate) fn new(rows: Vec<FieldBuffer>, rows_affected: u64) -> Self {
        Self {
            rows,
            rows_affected,
        }
    }

    pub fn rows(&self) -> &[FieldBuffer] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<FieldBuffer> {
        self.rows
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&FieldBuffer> {
        self.rows.first()
    }
}

impl IntoIterator for ResultSet {
    type Item = FieldBuffer;
    type IntoIter = std::vec::IntoIter<FieldBuffer>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
