//! Integration tests for control request dispatch

mod support;

use bytes::Bytes;
use gadget::{ControlError, ControlOutcome, DataSink, GadgetError};
use protocol::{
    ControlRequest, Endpoint, GET_DESCRIPTOR, HID_REPORT_DESCRIPTOR, HID_SET_IDLE, HID_SET_REPORT,
    ProtocolError, UAC_GET_CUR, UAC_SET_CUR, VENDOR_PROBE,
};
use support::bind;

#[test]
fn test_unknown_request_stalls() {
    let h = bind();
    let req = ControlRequest::new(0x21, 0x0b, 0, 2, 0);

    assert_eq!(
        h.gadget.setup(&req),
        Err(ControlError {
            request_type: 0x21,
            request: 0x0b,
            index: 2
        })
    );
    assert_eq!(h.transport.pending(Endpoint::HidIn), 0);
    assert!(!h.gadget.hid().poll().readable);
}

#[test]
fn test_unknown_interface_stalls() {
    let h = bind();
    let req = ControlRequest::new(0x21, HID_SET_IDLE, 0, 5, 0);
    assert!(h.gadget.setup(&req).is_err());
}

#[test]
fn test_report_descriptor_truncated_to_length() {
    let h = bind();

    let full = ControlRequest::new(0x81, GET_DESCRIPTOR, 0x2200, 2, 0x00ff);
    assert_eq!(
        h.gadget.setup(&full).unwrap(),
        ControlOutcome::Respond(Bytes::from_static(HID_REPORT_DESCRIPTOR))
    );

    let short = ControlRequest::new(0x81, GET_DESCRIPTOR, 0x2200, 2, 9);
    assert_eq!(
        h.gadget.setup(&short).unwrap(),
        ControlOutcome::Respond(Bytes::from_static(&HID_REPORT_DESCRIPTOR[..9]))
    );
}

#[test]
fn test_set_idle_and_vendor_probe() {
    let h = bind();

    let idle = ControlRequest::new(0x21, HID_SET_IDLE, 0, 2, 0);
    assert_eq!(h.gadget.setup(&idle).unwrap(), ControlOutcome::Ack);

    // Vendor probe is claimed whatever its index
    let probe = ControlRequest::new(0x40, VENDOR_PROBE, 0x6400, 0, 0);
    assert_eq!(h.gadget.setup(&probe).unwrap(), ControlOutcome::Ack);

    let probe_in = ControlRequest::new(0xc0, VENDOR_PROBE, 0, 9, 4);
    assert_eq!(h.gadget.setup(&probe_in).unwrap(), ControlOutcome::Ack);

    let probe_data = ControlRequest::new(0x40, VENDOR_PROBE, 0, 0, 3);
    let outcome = h.gadget.setup(&probe_data).unwrap();
    assert_eq!(
        outcome,
        ControlOutcome::Receive {
            length: 3,
            sink: DataSink::Discard
        }
    );
    h.gadget.control_data(DataSink::Discard, b"xyz");
    assert!(!h.gadget.hid().poll().readable);
}

#[test]
fn test_volume_passthrough() {
    let h = bind();

    let set = ControlRequest::new(0x21, UAC_SET_CUR, 0x0200, 0x0200, 2);
    let ControlOutcome::Receive { length, sink } = h.gadget.setup(&set).unwrap() else {
        panic!("SET_CUR must take a data stage");
    };
    assert_eq!((length, sink), (2, DataSink::Volume));
    h.gadget.control_data(sink, &[0x00, 0xf0]);

    let get = ControlRequest::new(0xa1, UAC_GET_CUR, 0x0200, 0x0200, 2);
    assert_eq!(
        h.gadget.setup(&get).unwrap(),
        ControlOutcome::Respond(Bytes::from_static(&[0x00, 0xf0]))
    );

    let longer = ControlRequest::new(0xa1, UAC_GET_CUR, 0x0200, 0x0200, 4);
    assert_eq!(
        h.gadget.setup(&longer).unwrap(),
        ControlOutcome::Respond(Bytes::from_static(&[0x00, 0xf0, 0x00, 0x00]))
    );
}

#[test]
fn test_volume_unset_reads_zero() {
    let h = bind();
    let get = ControlRequest::new(0xa1, UAC_GET_CUR, 0x0200, 0x0200, 2);
    assert_eq!(
        h.gadget.setup(&get).unwrap(),
        ControlOutcome::Respond(Bytes::from_static(&[0, 0]))
    );
}

#[test]
fn test_set_report_makes_channel_readable() {
    let h = bind();
    let handle = h.gadget.open_hid(true).unwrap();
    assert!(!handle.poll().readable);

    h.set_report(b"\x05\x01\x02\x03");
    assert!(handle.poll().readable);

    let mut buf = [0u8; 8];
    assert_eq!(handle.read(&mut buf), Ok(4));
    assert_eq!(&buf[..4], b"\x05\x01\x02\x03");
}

#[test]
fn test_zero_length_set_report_acks() {
    let h = bind();
    let req = ControlRequest::new(0x21, HID_SET_REPORT, 0x0205, 2, 0);
    assert_eq!(h.gadget.setup(&req).unwrap(), ControlOutcome::Ack);
    assert!(!h.gadget.hid().poll().readable);
}

#[test]
fn test_raw_setup_packets() {
    let h = bind();

    let raw = ControlRequest::new(0x21, HID_SET_REPORT, 0x0205, 2, 6).encode();
    assert_eq!(
        h.gadget.setup_packet(&raw).unwrap(),
        ControlOutcome::Receive {
            length: 6,
            sink: DataSink::Report
        }
    );

    assert!(matches!(
        h.gadget.setup_packet(&raw[..5]),
        Err(GadgetError::Protocol(ProtocolError::TruncatedSetup {
            needed: 8,
            available: 5
        }))
    ));

    let unknown = ControlRequest::new(0x21, 0x0b, 0, 2, 0).encode();
    assert!(matches!(
        h.gadget.setup_packet(&unknown),
        Err(GadgetError::Control(_))
    ));
}
