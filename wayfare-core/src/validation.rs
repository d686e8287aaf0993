use std::collections::BTreeMap;
use wayfare_shared::AppError;

/// Collects per-field validation failures so a caller sees all of them at once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors {
    fields: BTreeMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error whose
    /// details map every failing field to its message.
    pub fn into_result(self, message: &str) -> Result<(), AppError> {
        if self.fields.is_empty() {
            return Ok(());
        }
        let mut err = AppError::validation(message);
        for (field, reason) in self.fields {
            err = err.with_detail(&field, reason);
        }
        Err(err)
    }
}
