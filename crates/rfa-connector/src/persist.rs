//! Persistence of complete measurement records
//!
//! The database is a collaborator, not part of the core: the pipeline only
//! needs a write-only sink that executes one parameterized UPDATE per
//! record. [`MssqlSink`] is the production implementation over tiberius;
//! tests substitute their own sink.

use async_trait::async_trait;
use chrono::Utc;
use rfa_common::{Result, RfaError};
use tiberius::{Client, Config as TdsConfig};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, info};

use crate::record::MeasurementRecord;
use crate::route::ConnectionMap;

/// The fixed update against the externally owned order table. Positional
/// parameters, keyed by order number.
const UPDATE_SQL: &str = "\
    UPDATE tblScheidgut_Auftrag \
    SET curRFAAu = @P2, \
        curRFAAg = @P3, \
        curRFAPt = @P4, \
        curRFAPd = @P5, \
        curRFARh = @P6, \
        strRFAComment = @P7, \
        dtmRFAMeasureDate = @P8, \
        dtmRFACreatedAt = @P9 \
    WHERE PostenNr = @P1";

/// Write-only destination for complete measurement records.
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    /// Persist one record against the named target database.
    ///
    /// Returns the number of rows affected. Zero rows is not an error here;
    /// the caller decides what to make of it.
    async fn persist(&self, target: &str, record: &MeasurementRecord) -> Result<u64>;
}

/// SQL Server sink over tiberius.
///
/// Opens one connection per write; reports arrive seconds apart at most, so
/// pooling buys nothing here. Connection strings are ADO-style and come from
/// the [`ConnectionMap`] resolved at startup.
pub struct MssqlSink {
    connections: ConnectionMap,
}

impl MssqlSink {
    pub fn new(connections: ConnectionMap) -> Self {
        Self { connections }
    }

    async fn connect(&self, target: &str) -> Result<Client<tokio_util::compat::Compat<TcpStream>>> {
        let conn_str = self.connections.resolve(target)?;
        let config = TdsConfig::from_ado_string(conn_str)
            .map_err(|e| RfaError::Config(format!("invalid connection string for {target}: {e}")))?;

        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true)?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| RfaError::Database(e.to_string()))?;

        Ok(client)
    }
}

#[async_trait]
impl MeasurementSink for MssqlSink {
    async fn persist(&self, target: &str, record: &MeasurementRecord) -> Result<u64> {
        let mut client = self.connect(target).await?;

        let created_at = Utc::now().naive_utc();
        let result = client
            .execute(
                UPDATE_SQL,
                &[
                    &record.order_no,
                    &record.metals.au,
                    &record.metals.ag,
                    &record.metals.pt,
                    &record.metals.pd,
                    &record.metals.rh,
                    &record.comment,
                    &record.measure_date,
                    &created_at,
                ],
            )
            .await
            .map_err(|e| RfaError::Database(e.to_string()))?;

        let rows = result.total();
        if rows == 0 {
            // Matched no order; kept as a non-error, the row may simply not
            // exist yet in this target.
            debug!(order_no = %record.order_no, target_db = target, "Update affected no rows");
        } else {
            info!(
                order_no = %record.order_no,
                target_db = target,
                "Successfully stored measurement"
            );
        }

        Ok(rows)
    }
}
