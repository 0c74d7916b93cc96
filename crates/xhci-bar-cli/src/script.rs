//! Line-oriented stimulus scripts.
//!
//! ```text
//! # comment
//! read 0x00 7        # issue a read with tag 7 (tag defaults to a running counter)
//! write 0x38 0x8     # issue a write (optional third operand: byte enable)
//! tick 3             # idle ticks (default 1)
//! reset              # one reset tick
//! event              # interrupter 0 posts an event
//! attach 2 3         # device attach on port 2 at speed 3
//! detach 2
//! expect 0x38 0x8    # blocking read; fails the run on mismatch
//! ```

use anyhow::{anyhow, bail, Context, Result};
use xhci_bar::PortId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read { address: u32, tag: Option<u64> },
    Write { address: u32, data: u32, byte_enable: u8 },
    Tick(u64),
    Reset,
    Event,
    Attach { port: PortId, speed: u8 },
    Detach(PortId),
    Expect { address: u32, value: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    /// 1-based source line.
    pub number: usize,
    pub command: Command,
}

fn parse_u64(token: &str) -> Result<u64> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => token.replace('_', "").parse(),
    };
    parsed.with_context(|| format!("invalid number {token:?}"))
}

fn parse_u32(token: &str) -> Result<u32> {
    let v = parse_u64(token)?;
    u32::try_from(v).map_err(|_| anyhow!("{token} does not fit in 32 bits"))
}

fn parse_port(token: &str) -> Result<PortId> {
    match token {
        "1" | "primary" => Ok(PortId::Primary),
        "2" | "secondary" => Ok(PortId::Secondary),
        _ => bail!("unknown port {token:?} (expected 1/primary or 2/secondary)"),
    }
}

fn operand<'a>(op: &str, args: &[&'a str], i: usize) -> Result<&'a str> {
    args.get(i)
        .copied()
        .ok_or_else(|| anyhow!("`{op}` is missing operand {}", i + 1))
}

fn parse_command(tokens: &[&str]) -> Result<Command> {
    let (op, args) = tokens
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let arg = |i: usize| operand(op, args, i);
    let max_args = match *op {
        "read" => 2,
        "write" => 3,
        "tick" => 1,
        "reset" | "event" => 0,
        "attach" | "expect" => 2,
        "detach" => 1,
        _ => bail!("unknown command {op:?}"),
    };
    if args.len() > max_args {
        bail!("`{op}` takes at most {max_args} operand(s)");
    }

    let cmd = match *op {
        "read" => Command::Read {
            address: parse_u32(arg(0)?)?,
            tag: args.get(1).map(|t| parse_u64(t)).transpose()?,
        },
        "write" => Command::Write {
            address: parse_u32(arg(0)?)?,
            data: parse_u32(arg(1)?)?,
            byte_enable: match args.get(2) {
                Some(t) => u8::try_from(parse_u64(t)?)
                    .ok()
                    .filter(|be| *be <= 0xf)
                    .ok_or_else(|| anyhow!("byte enable {t} is not a 4-bit mask"))?,
                None => xhci_bar::WriteRequest::ALL_BYTES,
            },
        },
        "tick" => Command::Tick(args.first().map(|t| parse_u64(t)).transpose()?.unwrap_or(1)),
        "reset" => Command::Reset,
        "event" => Command::Event,
        "attach" => Command::Attach {
            port: parse_port(arg(0)?)?,
            speed: u8::try_from(parse_u64(arg(1)?)?).context("speed out of range")?,
        },
        "detach" => Command::Detach(parse_port(arg(0)?)?),
        "expect" => Command::Expect {
            address: parse_u32(arg(0)?)?,
            value: parse_u32(arg(1)?)?,
        },
        _ => bail!("unknown command {op:?}"),
    };
    Ok(cmd)
}

pub fn parse(source: &str) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        let text = raw.split('#').next().unwrap_or_default();
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let command = parse_command(&tokens).with_context(|| format!("line {number}: {raw:?}"))?;
        lines.push(Line { number, command });
    }
    Ok(lines)
}
