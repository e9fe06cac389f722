//! Idempotent begin/end timestamp recorder attached to message context.
use crate::errors::{InputError, Result};

use super::model::message::{Message, ProcessingInfo};

pub struct ProcessorAnnotator;

impl ProcessorAnnotator {
    /// Record processing timestamps for `instance_id` on the message context.
    ///
    /// Called twice per pass: once with only a start timestamp, once with
    /// only an end timestamp. Timestamps are write-once; a later call never
    /// clobbers a value that was already set.
    pub fn annotate(
        message: &mut Message,
        instance_id: &str,
        start_ts: Option<u64>,
        end_ts: Option<u64>,
    ) -> Result<()> {
        let context = message
            .context
            .as_mut()
            .ok_or_else(|| InputError::MissingContext(instance_id.to_string()))?;

        let processor = match context
            .processors
            .iter_mut()
            .find(|item| item.instance_id == instance_id)
        {
            Some(existing) => existing,
            None => {
                context.processors.push(ProcessingInfo {
                    instance_id: instance_id.to_string(),
                    begin: None,
                    end: None,
                });
                context.processors.last_mut().expect("just pushed")
            }
        };

        if processor.begin.is_none() {
            processor.begin = start_ts;
        }
        if processor.end.is_none() {
            processor.end = end_ts;
        }
        Ok(())
    }
}
