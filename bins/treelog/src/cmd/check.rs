use std::collections::BTreeMap;
use std::convert::Infallible;

use treelog::{Events, ReadOutcome, RecordInstance};

use super::{StreamInfo, read_stream};
use crate::config::{CheckArgs, Effective};
use crate::error::CliError;

/// Record counts gathered while decoding. Group handles are nesting depths,
/// root records being at depth 0.
#[derive(Debug, Default)]
pub struct Summary {
    pub objects: u64,
    pub groups: u64,
    pub max_depth: u32,
    pub per_type: BTreeMap<String, u64>,
}

impl Summary {
    fn count(&mut self, record: &RecordInstance, depth: u32) {
        *self.per_type.entry(record.type_name()).or_default() += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    pub fn report(&self, info: &StreamInfo) -> String {
        let mut out = format!(
            "version {}\ntypes {}\nrecords {} ({} groups, {} objects)\nmax depth {}\n",
            info.version,
            info.types.len(),
            info.records,
            self.groups,
            self.objects,
            self.max_depth,
        );
        for (name, count) in &self.per_type {
            out.push_str(&format!("  {name} {count}\n"));
        }
        if info.outcome == ReadOutcome::Stopped {
            out.push_str("stopped before end of stream\n");
        }
        out
    }
}

impl Events for Summary {
    type GroupId = u32;
    type Error = Infallible;

    fn object(&mut self, record: RecordInstance) -> Result<(), Infallible> {
        self.objects += 1;
        self.count(&record, 0);
        Ok(())
    }

    fn child_object(&mut self, record: RecordInstance, parent: &u32) -> Result<(), Infallible> {
        self.objects += 1;
        self.count(&record, parent + 1);
        Ok(())
    }

    fn begin_group(&mut self, record: RecordInstance) -> Result<u32, Infallible> {
        self.groups += 1;
        self.count(&record, 0);
        Ok(0)
    }

    fn begin_child_group(&mut self, record: RecordInstance, parent: &u32) -> Result<u32, Infallible> {
        self.groups += 1;
        self.count(&record, parent + 1);
        Ok(parent + 1)
    }

    fn end_group(&mut self, _group: u32) -> Result<(), Infallible> {
        Ok(())
    }
}

pub async fn run(args: CheckArgs) -> Result<(), CliError> {
    let eff = Effective::new(&args.input, false)?;
    let (summary, info) = read_stream(&eff, Summary::default()).await?;
    print!("{}", summary.report(&info));
    Ok(())
}
