//! Line-protocol harness: item records in on stdin, HAVE/NEED lines out.
//!
//! Each input line is `mode,timestamp,id` with the id hex-encoded. Mode 1
//! adds the item to the initiator's set, mode 2 to the responder's, mode 3
//! to both. When stdin closes, both sides are sealed, reconciliation runs
//! to convergence, and the result is printed as `xor,HAVE,<hex id>` and
//! `xor,NEED,<hex id>` lines.

use std::io::{self, BufRead, Write};

use anyhow::{bail, ensure, Context, Result};
use clap::Args;
use rangesync::Reconciler;

#[derive(Debug, Args)]
pub struct HarnessArgs {
    /// Id size in bytes (8..=32)
    #[arg(long, default_value_t = 16)]
    pub id_size: usize,

    /// Frame size limit in bytes (0 = unbounded, otherwise >= 1024)
    #[arg(long, default_value_t = 0)]
    pub frame_size_limit: u64,
}

pub fn run(args: HarnessArgs) -> Result<()> {
    let mut initiator = Reconciler::new(args.id_size)?;
    let mut responder = Reconciler::new(args.id_size)?;

    let stdin = io::stdin();
    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record = parse_record(line, args.id_size)
            .with_context(|| format!("bad record on line {}", index + 1))?;
        match record.mode {
            1 => initiator.add_item(record.timestamp, &record.id)?,
            2 => responder.add_item(record.timestamp, &record.id)?,
            3 => {
                initiator.add_item(record.timestamp, &record.id)?;
                responder.add_item(record.timestamp, &record.id)?;
            }
            other => bail!("unknown record mode {other}"),
        }
    }

    initiator.seal()?;
    responder.seal()?;

    let mut have_ids = Vec::new();
    let mut need_ids = Vec::new();
    let mut frame = initiator.initiate(args.frame_size_limit)?;

    loop {
        let reply = responder.reconcile(&frame)?;
        frame = initiator.reconcile_with_ids(&reply, &mut have_ids, &mut need_ids)?;
        if reply.is_empty() && frame.is_empty() {
            break;
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for id in &have_ids {
        writeln!(out, "xor,HAVE,{}", hex::encode(id))?;
    }
    for id in &need_ids {
        writeln!(out, "xor,NEED,{}", hex::encode(id))?;
    }

    Ok(())
}

struct Record {
    mode: u32,
    timestamp: u64,
    id: Vec<u8>,
}

fn parse_record(line: &str, id_size: usize) -> Result<Record> {
    let mut fields = line.splitn(3, ',');
    let mode = fields
        .next()
        .context("missing mode field")?
        .parse()
        .context("mode is not an integer")?;
    let timestamp = fields
        .next()
        .context("missing timestamp field")?
        .parse()
        .context("timestamp is not an integer")?;
    let id = hex::decode(fields.next().context("missing id field")?).context("id is not hex")?;
    ensure!(
        id.len() == id_size,
        "id is {} bytes, expected {id_size}",
        id.len()
    );
    Ok(Record {
        mode,
        timestamp,
        id,
    })
}
