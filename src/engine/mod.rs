//! The feed engine: one owner for connection, throttle, table and selection.
//!
//! Every input (transport notice, host command, timer fire) goes through
//! [`FeedEngine::handle`], one at a time. Nothing here blocks or spawns;
//! time is passed in, and the caller sleeps until [`FeedEngine::next_deadline`].

pub mod lifecycle;
pub mod status;
pub mod subscription;
pub mod throttle;

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::config::{Config, ThrottleInterval};
use crate::market_data::transport::Transport;
use crate::market_data::types::{CatalogEntry, InboundMessage, TransportNotice};
use crate::metrics;
use crate::state::merge::{ChangeReport, merge};
use crate::state::record::{RecordId, UpdatePayload};
use crate::state::record_table::RecordTable;
use crate::state::schema::{ColumnDef, derive_columns};

use lifecycle::{ConnectionLifecycle, ConnectionState, LifecycleOutcome};
use status::{RowFilter, StatusAggregator, StatusInputs, StatusSnapshot};
use subscription::SubscriptionController;
use throttle::ThrottleScheduler;

/// Host-initiated actions.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Start,
    Stop,
    Reset,
    CancelReset,
    Select(Vec<RecordId>),
    SelectAll,
    SetThrottle(ThrottleInterval),
    SetFilter(Option<RowFilter>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Transport(TransportNotice),
    Command(UserCommand),
    /// A timer fired; due deadlines are checked against `now`.
    Tick,
}

/// What the rendering layer receives after each flush.
#[derive(Debug, Clone)]
pub struct Frame {
    pub table: Arc<RecordTable>,
    pub report: ChangeReport,
    pub status: StatusSnapshot,
    /// Present only on the flush where the layout was first established.
    pub columns: Option<Vec<ColumnDef>>,
}

pub struct FeedEngine<T: Transport> {
    transport: T,
    lifecycle: ConnectionLifecycle,
    throttle: ThrottleScheduler,
    subscription: SubscriptionController,
    table: Arc<RecordTable>,
    catalog: Vec<CatalogEntry>,
    columns: Option<Vec<ColumnDef>>,
    columns_unflushed: bool,
    last_report: ChangeReport,
    last_merge: Option<SystemTime>,
    filter: Option<RowFilter>,
}

impl<T: Transport> FeedEngine<T> {
    pub fn new(config: &Config, transport: T) -> Self {
        Self {
            transport,
            lifecycle: ConnectionLifecycle::new(config.ws_api_url.clone(), config.reset_settle),
            throttle: ThrottleScheduler::new(config.throttle_default),
            subscription: SubscriptionController::new(),
            table: Arc::new(RecordTable::new()),
            catalog: Vec::new(),
            columns: None,
            columns_unflushed: false,
            last_report: ChangeReport::default(),
            last_merge: None,
            filter: None,
        }
    }

    /// Opens the first connection.
    pub fn start(&mut self) -> bool {
        self.lifecycle.connect(&mut self.transport)
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn table(&self) -> &Arc<RecordTable> {
        &self.table
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub fn columns(&self) -> Option<&[ColumnDef]> {
        self.columns.as_deref()
    }

    pub fn selected(&self) -> &[RecordId] {
        self.subscription.selected()
    }

    pub fn throttle(&self) -> &ThrottleScheduler {
        &self.throttle
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Earliest pending timer: throttle flush or reset settle.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.throttle.deadline(), self.lifecycle.reset_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusAggregator::derive(&StatusInputs {
            table: &self.table,
            last_report: &self.last_report,
            filter: self.filter.as_ref(),
            catalog_len: self.catalog.len(),
            selected_len: self.subscription.selected().len(),
            subscribed_len: self.subscription.subscribed_count(),
            last_merge: self.last_merge,
            connected: self.lifecycle.is_connected(),
            subscribed: self.subscription.is_active(),
            throttle: self.throttle.interval(),
        })
    }

    /// Single reaction function. Returns a frame when a flush happened.
    pub fn handle(&mut self, event: EngineEvent, now: Instant) -> Option<Frame> {
        match event {
            EngineEvent::Transport(notice) => {
                self.on_transport(notice, now);
                None
            }
            EngineEvent::Command(command) => {
                self.on_command(command, now);
                None
            }
            EngineEvent::Tick => self.on_tick(now),
        }
    }

    fn on_transport(&mut self, notice: TransportNotice, now: Instant) {
        match self.lifecycle.on_transport(notice) {
            LifecycleOutcome::Ignored | LifecycleOutcome::Opened => {}
            LifecycleOutcome::Lost => self.subscription.force_off(),
            LifecycleOutcome::Malformed(err) => {
                warn!(error = %err, "dropping inbound message");
                metrics::record_message("malformed");
            }
            LifecycleOutcome::Inbound(InboundMessage::Catalog(entries)) => {
                info!(tickers = entries.len(), "received ticker catalog");
                metrics::record_message("catalog");
                self.catalog = entries;
                self.subscription.reset();
            }
            LifecycleOutcome::Inbound(InboundMessage::Updates { payloads, sample }) => {
                metrics::record_message("update");
                if self.columns.is_none() && !payloads.is_empty() {
                    if let Some(sample) = sample {
                        let columns = derive_columns(&sample);
                        info!(columns = columns.len(), payloads = payloads.len(), "column layout established");
                        self.columns = Some(columns);
                        self.columns_unflushed = true;
                    }
                }
                self.throttle.schedule(payloads, now);
            }
        }
    }

    fn on_command(&mut self, command: UserCommand, now: Instant) {
        let connected = self.lifecycle.is_connected();
        match command {
            UserCommand::Start => {
                if let Err(err) = self.subscription.start(connected, &mut self.transport) {
                    warn!(error = %err, "subscribe failed");
                }
            }
            UserCommand::Stop => {
                if let Err(err) = self.subscription.stop(connected, &mut self.transport) {
                    warn!(error = %err, "unsubscribe failed");
                }
            }
            UserCommand::Select(ids) => self.subscription.select(ids),
            UserCommand::SelectAll => {
                let ids = self.catalog.iter().map(|entry| entry.id.clone()).collect();
                self.subscription.select(ids);
            }
            UserCommand::SetThrottle(interval) => {
                info!(%interval, "throttle interval set");
                self.throttle.set_interval(interval);
            }
            UserCommand::SetFilter(filter) => {
                debug!(?filter, "row filter set");
                self.filter = filter;
            }
            UserCommand::Reset => {
                if self.lifecycle.begin_reset(now, &mut self.transport) {
                    self.throttle.cancel();
                    self.subscription.force_off();
                }
            }
            UserCommand::CancelReset => {
                self.lifecycle.cancel_reset();
            }
            UserCommand::Shutdown => self.shutdown(),
        }
    }

    fn on_tick(&mut self, now: Instant) -> Option<Frame> {
        let reset = self.lifecycle.complete_reset(now, &mut self.transport);
        if reset {
            self.clear_connection_state();
        }

        match self.throttle.poll_flush(now) {
            Some(batch) => Some(self.flush(batch)),
            // Let the renderer drop its rows after a reset.
            None if reset => Some(Frame {
                table: Arc::clone(&self.table),
                report: ChangeReport::default(),
                status: self.status(),
                columns: None,
            }),
            None => None,
        }
    }

    fn flush(&mut self, batch: Vec<UpdatePayload>) -> Frame {
        let batch_size = batch.len();
        let (table, mut report) = merge(std::mem::take(&mut self.table), batch);
        self.table = table;

        report.schema_established = std::mem::take(&mut self.columns_unflushed);
        self.last_report = report.clone();
        self.last_merge = Some(SystemTime::now());

        metrics::record_flush(batch_size, self.table.len());
        metrics::record_merge(report.updated_count, report.deleted_count);

        Frame {
            table: Arc::clone(&self.table),
            columns: if report.schema_established {
                self.columns.clone()
            } else {
                None
            },
            report,
            status: self.status(),
        }
    }

    /// Reset is the only path that clears the table.
    fn clear_connection_state(&mut self) {
        self.table = Arc::new(RecordTable::new());
        self.catalog.clear();
        self.subscription.reset();
        self.columns = None;
        self.columns_unflushed = false;
        self.last_report = ChangeReport::default();
        info!(conn = self.lifecycle.connection_id(), "reset complete, state cleared");
    }

    fn shutdown(&mut self) {
        info!("feed engine shutting down");
        self.throttle.cancel();
        self.lifecycle.shutdown(&mut self.transport);
        self.subscription.force_off();
    }
}

impl<T: Transport> Drop for FeedEngine<T> {
    fn drop(&mut self) {
        if self.lifecycle.state() != ConnectionState::Disconnected {
            self.shutdown();
        }
    }
}
