//! Job import: one batch of customer orders becomes a scannable job
//!
//! Import is the only writer of jobs and box_requirements rows other
//! than the quantity-updating operations. Each box belongs to exactly
//! one customer and each customer to exactly one box; the import
//! rejects a batch that violates either direction.

use super::Engine;
use crate::db::{jobs, requirements};
use boxline_common::db::models::Job;
use boxline_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// One order line in an import batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLine {
    pub box_number: i64,
    pub bar_code: String,
    pub product_name: String,
    pub customer_name: String,
    pub required_qty: i64,
}

/// An import batch: job name plus its order lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobImport {
    pub name: String,
    pub lines: Vec<ImportLine>,
}

impl Engine {
    /// Create a job from an import batch
    ///
    /// The batch must be internally consistent: positive quantities,
    /// no duplicate (box, barcode) key, and a one-to-one mapping
    /// between boxes and customers.
    pub async fn import_job(&self, import: &JobImport) -> Result<Job> {
        validate_import(import)?;

        let job_id = Uuid::new_v4();
        let job = self
            .with_write_retry(|| async {
                let mut tx = self.pool().begin().await?;

                jobs::insert_job(&mut *tx, job_id, &import.name).await?;
                for line in &import.lines {
                    requirements::insert_requirement(
                        &mut *tx,
                        job_id,
                        line.box_number,
                        &line.bar_code,
                        &line.product_name,
                        &line.customer_name,
                        line.required_qty,
                    )
                    .await?;
                }

                tx.commit().await?;
                jobs::require_job(self.pool(), job_id).await
            })
            .await?;

        info!(
            "Imported job '{}' ({}) with {} lines",
            job.name,
            job.guid,
            import.lines.len()
        );

        Ok(job)
    }
}

fn validate_import(import: &JobImport) -> Result<()> {
    if import.name.trim().is_empty() {
        return Err(Error::Validation("job name must not be empty".to_string()));
    }
    if import.lines.is_empty() {
        return Err(Error::Validation(
            "import batch has no order lines".to_string(),
        ));
    }

    let mut box_customer: HashMap<i64, &str> = HashMap::new();
    let mut customer_box: HashMap<&str, i64> = HashMap::new();
    let mut seen_keys = std::collections::HashSet::new();

    for line in &import.lines {
        if line.box_number <= 0 {
            return Err(Error::Validation(format!(
                "box_number must be positive, got {}",
                line.box_number
            )));
        }
        if line.bar_code.trim().is_empty() {
            return Err(Error::Validation("bar_code must not be empty".to_string()));
        }
        if line.required_qty <= 0 {
            return Err(Error::Validation(format!(
                "required_qty must be positive for barcode {}",
                line.bar_code
            )));
        }
        if !seen_keys.insert((line.box_number, line.bar_code.as_str())) {
            return Err(Error::Validation(format!(
                "duplicate line for box {} barcode {}",
                line.box_number, line.bar_code
            )));
        }

        match box_customer.get(&line.box_number) {
            Some(existing) if *existing != line.customer_name.as_str() => {
                return Err(Error::Validation(format!(
                    "box {} is assigned to both '{}' and '{}'",
                    line.box_number, existing, line.customer_name
                )));
            }
            _ => {
                box_customer.insert(line.box_number, &line.customer_name);
            }
        }
        match customer_box.get(line.customer_name.as_str()) {
            Some(existing) if *existing != line.box_number => {
                return Err(Error::Validation(format!(
                    "customer '{}' is assigned to both box {} and box {}",
                    line.customer_name, existing, line.box_number
                )));
            }
            _ => {
                customer_box.insert(&line.customer_name, line.box_number);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(box_number: i64, bar_code: &str, customer: &str, qty: i64) -> ImportLine {
        ImportLine {
            box_number,
            bar_code: bar_code.to_string(),
            product_name: format!("product {}", bar_code),
            customer_name: customer.to_string(),
            required_qty: qty,
        }
    }

    #[test]
    fn accepts_consistent_batch() {
        let import = JobImport {
            name: "wave 1".to_string(),
            lines: vec![
                line(1, "A", "alice", 2),
                line(1, "B", "alice", 1),
                line(2, "A", "bob", 3),
            ],
        };
        assert!(validate_import(&import).is_ok());
    }

    #[test]
    fn rejects_box_with_two_customers() {
        let import = JobImport {
            name: "wave 1".to_string(),
            lines: vec![line(1, "A", "alice", 1), line(1, "B", "bob", 1)],
        };
        assert!(matches!(
            validate_import(&import),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_customer_with_two_boxes() {
        let import = JobImport {
            name: "wave 1".to_string(),
            lines: vec![line(1, "A", "alice", 1), line(2, "B", "alice", 1)],
        };
        assert!(matches!(
            validate_import(&import),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_duplicate_key_and_bad_quantity() {
        let dup = JobImport {
            name: "wave 1".to_string(),
            lines: vec![line(1, "A", "alice", 1), line(1, "A", "alice", 2)],
        };
        assert!(validate_import(&dup).is_err());

        let zero = JobImport {
            name: "wave 1".to_string(),
            lines: vec![line(1, "A", "alice", 0)],
        };
        assert!(validate_import(&zero).is_err());
    }
}
