pub mod check;
pub mod dump;

use std::io::Read;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use treelog::{Events, ReadOutcome, Reader, Session, StaticTypeSet, Version};

use crate::config::Effective;
use crate::error::CliError;

/// What the reader knew when it stopped.
#[derive(Debug)]
pub struct StreamInfo {
    pub version: Version,
    pub types: Vec<String>,
    pub records: u64,
    pub outcome: ReadOutcome,
}

fn open_input(path: &str) -> Result<Box<dyn Read + Send>, CliError> {
    if path == "-" {
        return Ok(Box::new(std::io::stdin()));
    }
    let file = std::fs::File::open(path).map_err(|source| CliError::Open {
        path: path.to_owned(),
        source,
    })?;
    Ok(Box::new(file))
}

/// Decode a whole stream into `events`, blocking on a worker thread.
/// Ctrl-C stops the read after the chunk in progress.
pub async fn read_stream<E>(eff: &Effective, events: E) -> Result<(E, StreamInfo), CliError>
where
    E: Events + Send + 'static,
{
    let input = open_input(&eff.input)?;
    let options = eff.reader.clone();
    let token = CancellationToken::new();
    let task_token = token.clone();

    let mut task = tokio::task::spawn_blocking(move || {
        decode(input, options, events, &task_token)
    });

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, stopping after the current chunk");
            token.cancel();
            task.await
        }
    };
    joined?
}

pub fn decode<R: Read, E: Events>(
    input: R,
    options: treelog::ReaderOptions,
    mut events: E,
    cancel: &CancellationToken,
) -> Result<(E, StreamInfo), CliError> {
    let mut reader = Reader::with_options(input, Arc::new(StaticTypeSet::default()), options)?;
    let outcome = reader.run(&mut events, &mut Session::new(), cancel)?;
    let info = StreamInfo {
        version: reader.version(),
        types: reader.registry().iter().map(|e| e.name().to_owned()).collect(),
        records: reader.records_read(),
        outcome,
    };
    if outcome == ReadOutcome::Stopped {
        tracing::warn!(records = info.records, "stream not read to the end");
    }
    Ok((events, info))
}
