use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Notification, NotificationRecord};
use crate::error::RegistryError;
use crate::lambda::{ContinuationDispatcher, ExecutionContext};
use crate::notify::{Notice, Notifier, Severity};
use crate::s3::ObjectStore;

pub const BATCH_SIZE: usize = 10;
pub const SCAN_LOW_WATER_MARK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanRequest {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutSummary {
    pub records: usize,
    pub invocations: usize,
}

impl fmt::Display for FanoutSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records processed in {} calls",
            self.records, self.invocations
        )
    }
}

pub struct Fanout<'a, S: ObjectStore, C: ContinuationDispatcher> {
    store: &'a S,
    dispatcher: &'a C,
    notifier: &'a dyn Notifier,
    target: String,
    batch_size: usize,
}

impl<'a, S: ObjectStore, C: ContinuationDispatcher> Fanout<'a, S, C> {
    pub fn new(
        store: &'a S,
        dispatcher: &'a C,
        notifier: &'a dyn Notifier,
        target: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            notifier,
            target: target.into(),
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn run(
        &self,
        bucket: &str,
        prefix: &str,
        ctx: &dyn ExecutionContext,
    ) -> Result<FanoutSummary, RegistryError> {
        let text = format!("I'm about to import all files under `{bucket}/{prefix}`, hold tight...");
        self.send(Notice::new(text, Severity::Info));

        let mut summary = FanoutSummary::default();
        let mut pending = Vec::with_capacity(self.batch_size);
        let mut token: Option<String> = None;

        'listing: loop {
            // Only continuation pages are gated; the first page always loads.
            if token.is_some() && ctx.remaining_time() < SCAN_LOW_WATER_MARK {
                self.out_of_time(bucket, prefix, &summary);
                break;
            }

            let page = self.store.list_page(bucket, prefix, token.as_deref())?;
            for object in page.objects {
                if ctx.remaining_time() < SCAN_LOW_WATER_MARK {
                    self.out_of_time(bucket, prefix, &summary);
                    break 'listing;
                }

                summary.records += 1;
                pending.push(NotificationRecord::new(
                    bucket,
                    &object.key,
                    object.size,
                    &object.e_tag,
                ));

                if pending.len() >= self.batch_size {
                    self.flush(&mut pending, &mut summary);
                }
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        if !pending.is_empty() {
            self.flush(&mut pending, &mut summary);
        }

        let remaining = ctx.remaining_time().as_secs_f64();
        let notice = Notice::new(
            format!("Finished invokes for `{bucket}/{prefix}` with *{remaining:.1}s* remaining"),
            Severity::Good,
        );
        self.send(with_counters(notice, &summary));

        tracing::info!(%summary, "fan-out complete");
        Ok(summary)
    }

    fn out_of_time(&self, bucket: &str, prefix: &str, summary: &FanoutSummary) {
        let notice = Notice::new(
            format!("Ran out of time for `{bucket}/{prefix}`"),
            Severity::Danger,
        );
        self.send(with_counters(notice, summary));
    }

    fn flush(&self, pending: &mut Vec<NotificationRecord>, summary: &mut FanoutSummary) {
        let payload = Notification {
            records: std::mem::take(pending),
        };
        match self.dispatcher.invoke(&self.target, &payload) {
            Ok(()) => summary.invocations += 1,
            Err(err) => tracing::error!(
                error = %err,
                records = payload.records.len(),
                "failed to invoke registry"
            ),
        }
    }

    fn send(&self, notice: Notice) {
        if let Err(err) = self.notifier.notify(&notice) {
            tracing::warn!(error = %err, "notification not delivered");
        }
    }
}

fn with_counters(notice: Notice, summary: &FanoutSummary) -> Notice {
    notice
        .field("Files Imported", summary.records)
        .field("Function Calls", summary.invocations)
}
