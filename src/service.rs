//! The ingest and query operations offered to a serving layer.
//!
//! [`IncomeService`] owns the [`DocumentStore`] it was constructed with and
//! runs the read → normalize → estimate → aggregate → save pipeline for each
//! upload. Query operations read only from the store.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, UTF_8};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    error::{IncomeError, IncomeResult},
    estimate,
    metrics::{self, MetricsBundle},
    normalize::{self, NormalizedTable},
    query::{ClientPage, ClientQuery},
    reader,
    store::{DocumentStore, OwnerSummary},
};

pub const ID_COLUMN: &str = "id";
pub const DEFAULT_OWNER: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub client_id: String,
    pub predicted_income: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub predictions: Vec<Prediction>,
    pub summary: OwnerSummary,
    pub delimiter: u8,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerListing {
    pub user_id: String,
    pub processed_at: DateTime<Utc>,
    pub total_clients: usize,
    pub mean_income: f64,
}

/// An upload that has been read, validated, normalized, estimated and
/// aggregated, but not yet written to any store.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub headers: Vec<String>,
    pub delimiter: u8,
    id_column: String,
    table: NormalizedTable,
    estimates: Vec<f64>,
    bundle: MetricsBundle,
}

impl PreparedUpload {
    pub fn parse(bytes: &[u8], encoding: &'static Encoding) -> IncomeResult<Self> {
        let raw = reader::read_table(bytes, encoding)?;
        let id_index = raw.require_column(ID_COLUMN)?;
        if raw.row_count() == 0 {
            return Err(IncomeError::EmptyTable);
        }
        info!(
            "Received data: {} row(s), {} column(s) {:?}",
            raw.row_count(),
            raw.column_count(),
            raw.headers
        );

        let table = normalize::normalize(&raw);
        let estimates = estimate::estimate_incomes(&table);
        let bundle = metrics::aggregate(&table, &estimates)?;
        Ok(Self {
            id_column: raw.headers[id_index].clone(),
            headers: raw.headers,
            delimiter: raw.delimiter,
            table,
            estimates,
            bundle,
        })
    }

    pub fn row_count(&self) -> usize {
        self.estimates.len()
    }
}

#[derive(Debug)]
pub struct IncomeService {
    store: DocumentStore,
    encoding: &'static Encoding,
}

impl IncomeService {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            encoding: UTF_8,
        }
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Runs the whole pipeline for one upload and persists the result under
    /// `owner_id`, replacing anything stored for that owner before.
    pub fn ingest(&self, bytes: &[u8], owner_id: &str) -> IncomeResult<IngestOutcome> {
        let upload = PreparedUpload::parse(bytes, self.encoding)?;
        self.save_upload(upload, owner_id)
    }

    /// Persists an already validated upload under `owner_id`.
    pub fn save_upload(&self, upload: PreparedUpload, owner_id: &str) -> IncomeResult<IngestOutcome> {
        let PreparedUpload {
            headers,
            delimiter,
            id_column,
            table,
            estimates,
            bundle,
        } = upload;
        let summary = self
            .store
            .save_owner_data(owner_id, &table, &estimates, bundle)?;
        let predictions = build_predictions(&table, &id_column, &estimates);
        info!(
            "Generated predictions and metrics for {} client(s) of owner '{}'",
            predictions.len(),
            owner_id
        );
        Ok(IngestOutcome {
            predictions,
            summary,
            delimiter,
            columns: headers,
        })
    }

    pub fn owner_metrics(&self, owner_id: &str) -> IncomeResult<Option<MetricsBundle>> {
        self.store.get_metrics(owner_id)
    }

    pub fn list_owners(&self) -> IncomeResult<Vec<OwnerListing>> {
        let now = Utc::now();
        Ok(self
            .store
            .list_owners()?
            .into_iter()
            .map(|(user_id, summary)| OwnerListing {
                user_id,
                processed_at: summary.processed_at.unwrap_or(now),
                total_clients: summary.total_users,
                mean_income: summary.mean_income,
            })
            .collect())
    }

    /// An unknown owner yields an empty, well-formed page rather than an error.
    pub fn owner_clients(&self, owner_id: &str, query: &ClientQuery) -> IncomeResult<ClientPage> {
        Ok(self
            .store
            .get_clients(owner_id, query)?
            .unwrap_or_else(|| ClientPage::empty(owner_id, query)))
    }
}

fn build_predictions(table: &NormalizedTable, id_column: &str, estimates: &[f64]) -> Vec<Prediction> {
    let ids = table.column(id_column);
    estimates
        .iter()
        .enumerate()
        .map(|(row, estimate)| Prediction {
            client_id: ids
                .and_then(|column| column.cells.get(row))
                .map(|cell| cell.label())
                .unwrap_or_else(|| row.to_string()),
            predicted_income: *estimate,
        })
        .collect()
}

pub fn write_predictions<W: Write>(
    writer: &mut csv::Writer<W>,
    predictions: &[Prediction],
) -> Result<()> {
    for prediction in predictions {
        writer
            .serialize(prediction)
            .with_context(|| format!("Writing prediction for client {}", prediction.client_id))?;
    }
    writer.flush().context("Flushing predictions output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;
    use tempfile::tempdir;

    #[test]
    fn predictions_csv_has_two_columns() {
        let predictions = vec![
            Prediction {
                client_id: "1".to_string(),
                predicted_income: 51234.5,
            },
            Prediction {
                client_id: "2".to_string(),
                predicted_income: 30000.0,
            },
        ];
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_predictions(&mut writer, &predictions).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "client_id,predicted_income\n1,51234.5\n2,30000.0\n"
        );
    }

    #[test]
    fn header_only_upload_is_rejected() {
        let dir = tempdir().unwrap();
        let service = IncomeService::new(DocumentStore::open(StoreConfig::new(dir.path())).unwrap());
        let err = service.ingest(b"id;age\n", "u1").unwrap_err();
        assert!(matches!(err, IncomeError::EmptyTable));
        assert!(service.list_owners().unwrap().is_empty());
    }

    #[test]
    fn prepared_upload_touches_no_store() {
        let upload = PreparedUpload::parse(b"id;age\n1;30\n2;\n", UTF_8).unwrap();
        assert_eq!(upload.row_count(), 2);
        assert_eq!(upload.delimiter, b';');

        let dir = tempdir().unwrap();
        let service = IncomeService::new(DocumentStore::open(StoreConfig::new(dir.path())).unwrap());
        let outcome = service.save_upload(upload, "u1").unwrap();
        assert_eq!(outcome.predictions.len(), 2);
        assert_eq!(outcome.predictions[0].client_id, "1");
        assert_eq!(service.list_owners().unwrap()[0].total_clients, 2);
    }
}
