use crate::error::EtlError;
use crate::loader::{LoadReport, SchemaOutcome};
use serde::{Deserialize, Serialize};

// ============================================================================
// Transform Summary
// ============================================================================

/// What the cleaning stages did to the table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformSummary {
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    pub rows_before: usize,
    pub rows_after: usize,
    pub duplicates_removed: usize,
    pub outliers_removed: usize,

    /// Null cells across all columns before and after imputation.
    pub nulls_before: usize,
    pub nulls_after: usize,

    /// Actions taken, in order.
    pub actions: Vec<TransformAction>,

    /// One line per filled column.
    pub processing_steps: Vec<String>,

    pub warnings: Vec<String>,
}

impl TransformSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(&mut self, action: TransformAction) {
        self.actions.push(action);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Percentage of rows removed by dedup and outlier filtering.
    pub fn rows_removed_percentage(&self) -> f32 {
        if self.rows_before == 0 {
            0.0
        } else {
            let removed = self.rows_before.saturating_sub(self.rows_after);
            (removed as f32 / self.rows_before as f32) * 100.0
        }
    }

    /// One-line description for the run report.
    pub fn summary(&self) -> String {
        format!(
            "Cleaned {} -> {} rows ({} duplicates, {} outliers removed; {} of {} nulls filled) in {}ms",
            self.rows_before,
            self.rows_after,
            self.duplicates_removed,
            self.outliers_removed,
            self.nulls_before.saturating_sub(self.nulls_after),
            self.nulls_before,
            self.duration_ms
        )
    }
}

/// A single action taken during cleaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformAction {
    pub action_type: ActionType,
    /// Column name, or "dataset" for whole-row operations.
    pub target: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TransformAction {
    pub fn new(
        action_type: ActionType,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            target: target.into(),
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Types of cleaning actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    DuplicatesRemoved,
    ValueImputed,
    OutliersRemoved,
}

impl ActionType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DuplicatesRemoved => "Duplicates Removed",
            Self::ValueImputed => "Value Imputed",
            Self::OutliersRemoved => "Outliers Removed",
        }
    }
}

// ============================================================================
// Pipeline Result
// ============================================================================

/// Everything a full run produced.
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    /// True when every batch was committed.
    pub success: bool,
    pub transform: TransformSummary,
    pub schema: SchemaOutcome,
    pub load: LoadReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EtlError>,
}

impl PipelineResult {
    pub(crate) fn new(transform: TransformSummary, schema: SchemaOutcome, load: LoadReport) -> Self {
        Self {
            success: load.is_complete(),
            error: load.error(),
            transform,
            schema,
            load,
        }
    }

    /// Human-readable run report, one line per stage.
    pub fn summary(&self) -> String {
        let schema = match &self.schema {
            SchemaOutcome::Ensured { .. } => format!("Table '{}' ensured", self.load.table_name),
            SchemaOutcome::Skipped { error } => format!("Table creation skipped: {error}"),
        };
        let mut lines = vec![self.transform.summary(), schema, self.load.summary()];
        lines.extend(self.transform.warnings.iter().map(|w| format!("warning: {w}")));
        lines.join("\n")
    }
}

// ============================================================================
// Tests
// ============================================================================
