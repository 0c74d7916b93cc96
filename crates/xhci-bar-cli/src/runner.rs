//! Executes a parsed script against an engine, one tick per issued request.

use std::io::Write;

use anyhow::{bail, Result};
use xhci_bar::pipeline::{ReadRequest, WriteRequest};
use xhci_bar::{ReadTag, TickInputs, XhciBar};

use crate::script::{Command, Line};

/// Tag reserved for `expect` reads so their responses are not echoed. Script tags are at most
/// 64 bits wide and can never collide with it.
const EXPECT_TAG: u128 = 1 << (xhci_bar::pipeline::READ_TAG_BITS - 1);

pub struct Runner<'a, W: Write> {
    bar: &'a mut XhciBar,
    out: W,
    next_tag: u64,
    expect_result: Option<u32>,
}

impl<'a, W: Write> Runner<'a, W> {
    pub fn new(bar: &'a mut XhciBar, out: W) -> Self {
        Self {
            bar,
            out,
            next_tag: 0,
            expect_result: None,
        }
    }

    pub fn run(&mut self, lines: &[Line]) -> Result<()> {
        for line in lines {
            tracing::debug!(line = line.number, command = ?line.command, "exec");
            self.exec(line)?;
        }
        self.drain()?;
        Ok(())
    }

    fn exec(&mut self, line: &Line) -> Result<()> {
        match line.command {
            Command::Read { address, tag } => {
                let tag = tag.unwrap_or_else(|| {
                    let t = self.next_tag;
                    self.next_tag = self.next_tag.wrapping_add(1);
                    t
                });
                self.step(TickInputs::read(tag, address))?;
            }
            Command::Write {
                address,
                data,
                byte_enable,
            } => {
                self.step(TickInputs {
                    write: Some(WriteRequest {
                        address,
                        data,
                        byte_enable,
                    }),
                    ..TickInputs::idle()
                })?;
            }
            Command::Tick(n) => {
                for _ in 0..n {
                    self.step(TickInputs::idle())?;
                }
            }
            Command::Reset => self.step(TickInputs::reset())?,
            Command::Event => self.bar.raise_event(),
            Command::Attach { port, speed } => self.bar.attach_port(port, speed),
            Command::Detach(port) => self.bar.detach_port(port),
            Command::Expect { address, value } => {
                self.drain()?;
                self.step(TickInputs {
                    read: Some(ReadRequest {
                        tag: ReadTag::new(EXPECT_TAG),
                        address,
                    }),
                    ..TickInputs::idle()
                })?;
                self.drain()?;
                match self.expect_result.take() {
                    Some(actual) if actual == value => {}
                    Some(actual) => bail!(
                        "line {}: expected {address:#x} = {value:#010x}, read {actual:#010x}",
                        line.number
                    ),
                    None => bail!("line {}: read of {address:#x} never completed", line.number),
                }
            }
        }
        Ok(())
    }

    /// Idles until no request is in flight.
    fn drain(&mut self) -> Result<()> {
        while !self.bar.pipeline_idle() {
            self.step(TickInputs::idle())?;
        }
        Ok(())
    }

    fn step(&mut self, inputs: TickInputs) -> Result<()> {
        let out = self.bar.tick(inputs);
        if let Some(resp) = out.read_response {
            if resp.tag.get() == EXPECT_TAG {
                self.expect_result = Some(resp.data);
            } else {
                writeln!(
                    self.out,
                    "tick={} tag={:#x} data={:#010x}",
                    self.bar.ticks(),
                    resp.tag.get(),
                    resp.data
                )?;
            }
        }
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script;
    use xhci_bar::XhciBarConfig;

    fn run(source: &str) -> Result<String> {
        let mut bar = XhciBar::new(XhciBarConfig::default())?;
        let mut runner = Runner::new(&mut bar, Vec::new());
        runner.run(&script::parse(source)?)?;
        Ok(String::from_utf8(runner.into_output())?)
    }

    #[test]
    fn reads_print_when_their_response_arrives() {
        let out = run("read 0x0 0x2a\nread 0x18\n").unwrap();
        assert_eq!(
            out,
            "tick=3 tag=0x2a data=0x01000020\ntick=4 tag=0x0 data=0x00000600\n"
        );
    }

    #[test]
    fn expect_is_silent_on_match_and_fails_on_mismatch() {
        assert_eq!(run("write 0x58 5\nexpect 0x58 5\n").unwrap(), "");
        let err = run("tick\nexpect 0x58 6\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn hooks_feed_into_register_state() {
        run("event\nexpect 0x24 0x9\nattach 2 3\nexpect 0x24 0x19\ndetach 2\nexpect 0x24 0x19\n")
            .unwrap();
    }
}
