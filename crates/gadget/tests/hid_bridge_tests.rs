//! Integration tests for the HID report bridge
//!
//! Tests the report channel end to end on the loopback transport:
//! - Record framing in both directions
//! - Blocking, non-blocking and interrupted calls
//! - Activation ref counting and teardown

mod support;

use common::GadgetEvent;
use common::test_utils::{DEFAULT_TEST_TIMEOUT, random_records, wait_until};
use gadget::{GadgetConfig, HidError};
use protocol::{Endpoint, HID_INTERFACE, LinkSpeed};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use support::{bind, bind_with};

mod outbound {
    use super::*;

    #[test]
    fn test_two_writes_are_two_transfers() {
        let h = bind();
        h.gadget.set_alt(HID_INTERFACE, 0).unwrap();
        let handle = h.gadget.open_hid(false).unwrap();

        assert_eq!(handle.write(b"AB"), Ok(2));
        assert_eq!(handle.write(b"CDE"), Ok(3));

        assert_eq!(h.ack_report().unwrap(), b"AB");
        assert_eq!(h.ack_report().unwrap(), b"CDE");
        assert!(
            h.transport
                .wait_take(Endpoint::HidIn, Duration::from_millis(50))
                .is_none()
        );
    }

    #[test]
    fn test_random_records_keep_framing() {
        let h = bind();
        h.gadget.set_alt(HID_INTERFACE, 0).unwrap();
        let handle = h.gadget.open_hid(false).unwrap();
        let records = random_records(32, 256);

        let writer = {
            let records = records.clone();
            thread::spawn(move || {
                for record in &records {
                    assert_eq!(handle.write(record), Ok(record.len()));
                }
                handle
            })
        };

        for record in &records {
            assert_eq!(&h.ack_report().unwrap(), record);
        }
        drop(writer.join().unwrap());

        let sent = h
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, GadgetEvent::ReportSent { .. }))
            .count();
        assert_eq!(sent, records.len());
    }

    #[test]
    fn test_nonblocking_write_over_capacity_changes_nothing() {
        let h = bind();
        h.gadget.set_alt(HID_INTERFACE, 0).unwrap();
        let handle = h.gadget.open_hid(true).unwrap();

        // First record goes in flight and is held by the host
        handle.write(&[0xf0; 1024]).unwrap();
        let in_flight = h
            .transport
            .wait_take(Endpoint::HidIn, DEFAULT_TEST_TIMEOUT)
            .unwrap();

        for id in 1..=4u8 {
            assert_eq!(handle.write(&[id; 1024]), Ok(1024));
        }
        assert!(!handle.poll().writable);
        assert_eq!(handle.write(b"x"), Err(HidError::WouldBlock));
        assert!(!handle.poll().writable);

        h.gadget.complete(common::Completion::completed(in_flight));
        for id in 1..=4u8 {
            assert_eq!(h.ack_report().unwrap(), vec![id; 1024]);
        }
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || handle.poll().writable));
    }

    #[test]
    fn test_oversized_and_empty_writes() {
        let h = bind();
        let handle = h.gadget.open_hid(true).unwrap();

        assert_eq!(
            handle.write(&[0u8; 1025]),
            Err(HidError::ReportTooLong {
                len: 1025,
                max: 1024
            })
        );
        assert_eq!(handle.write(&[]), Ok(0));
    }

    #[test]
    fn test_blocked_writer_wakes_when_drained() {
        let mut config = GadgetConfig::default();
        config.hid.report_length = 64;
        config.hid.queue_capacity = 64;
        let h = bind_with(&config, LinkSpeed::Full);
        h.gadget.set_alt(HID_INTERFACE, 0).unwrap();
        let handle = Arc::new(h.gadget.open_hid(false).unwrap());

        handle.write(&[1; 64]).unwrap();
        let first = h
            .transport
            .wait_take(Endpoint::HidIn, DEFAULT_TEST_TIMEOUT)
            .unwrap();
        handle.write(&[2; 64]).unwrap();

        let writer = {
            let handle = handle.clone();
            thread::spawn(move || handle.write(&[3; 64]))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!writer.is_finished());

        h.gadget.complete(common::Completion::completed(first));
        assert_eq!(writer.join().unwrap(), Ok(64));
        assert_eq!(h.ack_report().unwrap(), vec![2; 64]);
        assert_eq!(h.ack_report().unwrap(), vec![3; 64]);
    }
}

mod inbound {
    use super::*;

    #[test]
    fn test_blocked_read_wakes_on_report() {
        let h = bind();
        let handle = h.gadget.open_hid(false).unwrap();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let n = handle.read(&mut buf)?;
            Ok::<_, HidError>(buf[..n].to_vec())
        });

        thread::sleep(Duration::from_millis(50));
        h.set_report(b"\x05hello");

        assert_eq!(reader.join().unwrap().unwrap(), b"\x05hello");
    }

    #[test]
    fn test_reports_read_whole_and_in_order() {
        let h = bind();
        let handle = h.gadget.open_hid(true).unwrap();
        let mut records = random_records(8, 64);
        for record in &mut records {
            record[0] = 0x05;
            h.set_report(record);
        }

        let mut buf = [0u8; 64];
        for record in &records {
            let n = handle.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], record.as_slice());
        }
        assert_eq!(handle.read(&mut buf), Err(HidError::WouldBlock));
    }

    #[test]
    fn test_small_buffer_keeps_record() {
        let h = bind();
        let handle = h.gadget.open_hid(true).unwrap();
        h.set_report(b"\x06abcdef");

        let mut small = [0u8; 4];
        assert_eq!(
            handle.read(&mut small),
            Err(HidError::BufferTooSmall {
                needed: 7,
                available: 4
            })
        );

        let mut buf = [0u8; 16];
        assert_eq!(handle.read(&mut buf), Ok(7));
        assert_eq!(&buf[..7], b"\x06abcdef");
    }

    #[test]
    fn test_full_read_queue_drops_report() {
        let h = bind();
        let _handle = h.gadget.open_hid(true).unwrap();

        for id in 5..=9u8 {
            h.set_report(&[id; 1024]);
        }

        let dropped: Vec<usize> = h
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                GadgetEvent::ReportDropped { len } => Some(len),
                _ => None,
            })
            .collect();
        assert_eq!(dropped, vec![1024]);
    }

    #[test]
    fn test_interrupt_out_endpoint_feeds_reader() {
        let mut config = GadgetConfig::default();
        config.hid.out_endpoint = true;
        let h = bind_with(&config, LinkSpeed::High);
        h.gadget.set_alt(HID_INTERFACE, 0).unwrap();
        let handle = h.gadget.open_hid(true).unwrap();

        let transfer = h.transport.take(Endpoint::HidOut).unwrap();
        h.gadget
            .complete(common::Completion::received(transfer, b"\x07out"));

        let mut buf = [0u8; 64];
        let n = handle.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\x07out");
        assert_eq!(h.transport.pending(Endpoint::HidOut), 4);
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_open_close_ref_counting() {
        let h = bind();

        let a = h.gadget.open_hid(false).unwrap();
        let b = h.gadget.open_hid(true).unwrap();
        assert_eq!(h.registrar.registrations(), 1);

        drop(a);
        assert_eq!(h.registrar.unregistrations(), 0);
        drop(b);
        assert_eq!(h.registrar.unregistrations(), 1);

        let events = h.drain_events();
        assert!(events.contains(&GadgetEvent::FunctionActivated));
        assert!(events.contains(&GadgetEvent::FunctionDeactivated));
    }

    #[test]
    fn test_refused_activation() {
        let h = bind();
        h.registrar.refuse(true);
        assert!(matches!(
            h.gadget.open_hid(false),
            Err(HidError::Activation(_))
        ));
    }

    #[test]
    fn test_interrupt_blocked_read_then_retry() {
        let h = bind();
        let handle = Arc::new(h.gadget.open_hid(false).unwrap());

        let reader = {
            let handle = handle.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                handle.read(&mut buf)
            })
        };
        thread::sleep(Duration::from_millis(50));
        handle.interrupt();
        assert_eq!(reader.join().unwrap(), Err(HidError::Interrupted));

        h.set_report(b"\x05again");
        let mut buf = [0u8; 16];
        assert_eq!(handle.read(&mut buf), Ok(7));
    }

    #[test]
    fn test_unbind_closes_blocked_reader() {
        let h = bind();
        let handle = h.gadget.open_hid(false).unwrap();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 16];
            handle.read(&mut buf)
        });
        thread::sleep(Duration::from_millis(50));

        h.gadget.unbind();
        assert_eq!(reader.join().unwrap(), Err(HidError::Closed));
    }

    #[test]
    fn test_disable_with_queued_reports_then_reselect() {
        let h = bind();
        h.gadget.set_alt(HID_INTERFACE, 0).unwrap();
        let handle = h.gadget.open_hid(false).unwrap();

        for record in [b"A", b"B", b"C"] {
            handle.write(record).unwrap();
        }
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || {
            h.transport.pending(Endpoint::HidIn) >= 1
        }));

        h.gadget.disable();
        h.gadget.set_alt(HID_INTERFACE, 0).unwrap();
        handle.write(b"D").unwrap();

        // Records queued across the disable may or may not go out; D must
        let mut delivered = false;
        while let Some(report) = h.ack_report() {
            if report == b"D" {
                delivered = true;
                break;
            }
        }
        assert!(delivered);
    }

    #[test]
    fn test_disabled_endpoint_drops_queued_report() {
        let h = bind();
        let handle = h.gadget.open_hid(false).unwrap();

        // Endpoint never enabled: the drain worker drops the record
        handle.write(b"lost").unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(
            h.transport
                .wait_take(Endpoint::HidIn, Duration::from_millis(50))
                .is_none()
        );

        h.gadget.set_alt(HID_INTERFACE, 0).unwrap();
        handle.write(b"kept").unwrap();
        assert_eq!(h.ack_report().unwrap(), b"kept");
    }
}
