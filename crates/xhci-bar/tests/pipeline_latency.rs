use xhci_bar::pipeline::{ReadRequest, WriteRequest};
use xhci_bar::regs::op;
use xhci_bar::{ReadResponse, ReadTag, TickInputs};

mod util;

#[test]
fn read_response_arrives_exactly_two_ticks_after_issue() {
    let mut bar = util::default_bar();
    let tag = ReadTag::new(0x42);

    let t0 = bar.tick(TickInputs::read(tag, 0x04));
    assert_eq!(t0.read_response, None);
    let t1 = bar.tick(TickInputs::idle());
    assert_eq!(t1.read_response, None);
    let t2 = bar.tick(TickInputs::idle());
    assert_eq!(
        t2.read_response,
        Some(ReadResponse {
            tag,
            data: xhci_bar::regs::HCSPARAMS1_VALUE
        })
    );
    assert_eq!(bar.tick(TickInputs::idle()).read_response, None);
}

#[test]
fn no_response_without_a_request() {
    let mut bar = util::default_bar();
    for _ in 0..64 {
        assert_eq!(bar.tick(TickInputs::idle()).read_response, None);
    }
    util::write(&mut bar, op::CONFIG, 1);
    for _ in 0..8 {
        assert_eq!(bar.tick(TickInputs::idle()).read_response, None);
    }
}

#[test]
fn back_to_back_reads_return_in_issue_order() {
    let mut bar = util::default_bar();
    let addrs = [0x00u32, 0x04, 0x08, 0x0c, 0x10];
    let mut responses = Vec::new();
    for (i, &addr) in addrs.iter().enumerate() {
        responses.extend(bar.tick(TickInputs::read(i as u64, addr)).read_response);
    }
    for _ in 0..2 {
        responses.extend(bar.tick(TickInputs::idle()).read_response);
    }

    let tags: Vec<u128> = responses.iter().map(|r| r.tag.get()).collect();
    assert_eq!(tags, vec![0, 1, 2, 3, 4]);
    assert_eq!(responses[0].data, 0x0100_0020);
    assert_eq!(responses[3].data, 0x07ff_000a);
}

#[test]
fn simultaneous_read_and_write_drops_the_write() {
    let mut bar = util::default_bar();
    let both = TickInputs {
        reset: false,
        read: Some(ReadRequest {
            tag: ReadTag::new(9),
            address: op::CONFIG,
        }),
        write: Some(WriteRequest::new(op::CONFIG, 0x7)),
    };
    bar.tick(both);
    bar.tick(TickInputs::idle());
    let out = bar.tick(TickInputs::idle());
    assert_eq!(out.read_response.map(|r| r.data), Some(0));
    assert_eq!(util::read(&mut bar, op::CONFIG), 0, "write was discarded");
}

#[test]
fn write_is_visible_to_a_read_issued_on_the_next_tick() {
    let mut bar = util::default_bar();
    bar.tick(TickInputs::write(op::DNCTRL, 0xffff));
    bar.tick(TickInputs::read(1u64, op::DNCTRL));
    bar.tick(TickInputs::idle());
    let out = bar.tick(TickInputs::idle());
    assert_eq!(out.read_response.map(|r| r.data), Some(0xffff));
}

#[test]
fn reset_tick_discards_in_flight_read() {
    let mut bar = util::default_bar();
    bar.tick(TickInputs::read(5u64, 0));
    let out = bar.tick(TickInputs {
        reset: true,
        ..TickInputs::read(6u64, 0)
    });
    assert_eq!(out.read_response, None);
    assert!(!out.need_interrupt);
    for _ in 0..4 {
        assert_eq!(bar.tick(TickInputs::idle()).read_response, None);
    }
}

#[test]
fn byte_enable_is_ignored() {
    let mut bar = util::default_bar();
    bar.tick(TickInputs {
        write: Some(WriteRequest {
            address: op::CONFIG,
            data: 0xdead_beef,
            byte_enable: 0x1,
        }),
        ..TickInputs::idle()
    });
    util::idle(&mut bar, 2);
    assert_eq!(util::read(&mut bar, op::CONFIG), 0xdead_beef);
}

#[test]
fn unaligned_and_out_of_window_addresses_are_masked() {
    let mut bar = util::default_bar();
    assert_eq!(util::read(&mut bar, 0x0000_1003), 0x0100_0020);
    util::write(&mut bar, 0xabcd_e05a, 0x33);
    assert_eq!(util::read(&mut bar, op::CONFIG), 0x33);
}
