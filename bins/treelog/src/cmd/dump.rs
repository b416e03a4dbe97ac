use std::io::{BufWriter, Write};

use serde::Serialize;
use treelog::{Events, RecordInstance};

use super::read_stream;
use crate::config::{DumpArgs, Effective};
use crate::error::CliError;

#[derive(Serialize)]
struct Line<'a> {
    event: &'a str,
    id: u64,
    parent: Option<u64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<serde_json::Value>,
}

/// Writes one JSON object per event. Group handles are stream record ids.
pub struct JsonLines<W: Write> {
    out: W,
    pretty: bool,
    next_id: u64,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W, pretty: bool) -> Self {
        Self { out, pretty, next_id: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn record(
        &mut self,
        event: &str,
        parent: Option<u64>,
        record: RecordInstance,
    ) -> Result<u64, CliError> {
        let id = self.next_id;
        self.next_id += 1;
        let line = Line {
            event,
            id,
            parent,
            type_name: Some(record.type_name()),
            record: Some(record.to_json()?),
        };
        self.write(&line)?;
        Ok(id)
    }

    fn write(&mut self, line: &Line<'_>) -> Result<(), CliError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, line)?;
        } else {
            serde_json::to_writer(&mut self.out, line)?;
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> Events for JsonLines<W> {
    type GroupId = u64;
    type Error = CliError;

    fn object(&mut self, record: RecordInstance) -> Result<(), CliError> {
        self.record("object", None, record).map(|_| ())
    }

    fn child_object(&mut self, record: RecordInstance, parent: &u64) -> Result<(), CliError> {
        self.record("child_object", Some(*parent), record).map(|_| ())
    }

    fn begin_group(&mut self, record: RecordInstance) -> Result<u64, CliError> {
        self.record("begin_group", None, record)
    }

    fn begin_child_group(&mut self, record: RecordInstance, parent: &u64) -> Result<u64, CliError> {
        self.record("begin_child_group", Some(*parent), record)
    }

    fn end_group(&mut self, group: u64) -> Result<(), CliError> {
        let line = Line {
            event: "end_group",
            id: group,
            parent: None,
            type_name: None,
            record: None,
        };
        self.write(&line)
    }
}

pub async fn run(args: DumpArgs) -> Result<(), CliError> {
    let eff = Effective::new(&args.input, args.pretty)?;
    tracing::debug!(input = %eff.input, pretty = eff.pretty, "dumping stream");

    let lines = JsonLines::new(BufWriter::new(std::io::stdout()), eff.pretty);
    let (lines, info) = read_stream(&eff, lines).await?;
    lines.into_inner().flush()?;
    tracing::info!(
        records = info.records,
        types = info.types.len(),
        outcome = ?info.outcome,
        "dump finished"
    );
    Ok(())
}
