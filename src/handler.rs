use std::time::Duration;

use crate::dataservice::Dataservice;
use crate::domain::{BatchResult, Notification};
use crate::importer::Importer;
use crate::lambda::{ContinuationDispatcher, ExecutionContext};
use crate::s3::ObjectStore;

pub const DEFAULT_LOW_WATER_MARK: Duration = Duration::from_secs(10);

pub struct BatchHandler<S: ObjectStore, D: Dataservice, C: ContinuationDispatcher> {
    store: S,
    dataservice: D,
    dispatcher: C,
    low_water_mark: Duration,
}

impl<S: ObjectStore, D: Dataservice, C: ContinuationDispatcher> BatchHandler<S, D, C> {
    pub fn new(store: S, dataservice: D, dispatcher: C) -> Self {
        Self {
            store,
            dataservice,
            dispatcher,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }

    pub fn with_low_water_mark(mut self, low_water_mark: Duration) -> Self {
        self.low_water_mark = low_water_mark;
        self
    }

    pub fn dataservice(&self) -> &D {
        &self.dataservice
    }

    pub fn dispatcher(&self) -> &C {
        &self.dispatcher
    }

    pub fn handle(&self, notification: Notification, ctx: &dyn ExecutionContext) -> BatchResult {
        tracing::info!(
            record_count = notification.records.len(),
            "processing s3 records"
        );

        let mut importer = Importer::new(&self.store, &self.dataservice);
        let mut results = BatchResult::new();
        let mut records = notification.records;

        let mut index = 0;
        while index < records.len() {
            // The first record always runs so an oversized record cannot loop forever.
            if index > 0 {
                let time_left = ctx.remaining_time();
                if time_left < self.low_water_mark {
                    let remaining = Notification {
                        records: records.split_off(index),
                    };
                    self.continue_with(remaining, time_left, ctx);
                    break;
                }
            }

            let record = &records[index];
            let span = tracing::info_span!("process_record", location = %record.location());
            let _guard = span.enter();
            let outcome = importer.import_from_event(record);
            results.insert(record.location(), outcome);
            index += 1;
        }

        tracing::trace!(processed = results.len(), "processing complete");
        results
    }

    fn continue_with(
        &self,
        remaining: Notification,
        time_left: Duration,
        ctx: &dyn ExecutionContext,
    ) {
        let function_name = ctx.function_name();
        tracing::warn!(
            remaining_records = remaining.records.len(),
            remaining_ms = time_left.as_millis() as u64,
            function_name,
            "time budget low, continuing in a new invocation"
        );
        if let Err(err) = self.dispatcher.invoke(function_name, &remaining) {
            tracing::error!(error = %err, "continuation lost");
        }
    }
}
