//! Shared fixtures for the gadget integration tests

#![allow(dead_code)]

use common::test_utils::{DEFAULT_TEST_TIMEOUT, MockRegistrar};
use common::{Completion, EventReceiver, GadgetEvent, LoopbackTransport, create_event_channel};
use gadget::{ControlOutcome, Gadget, GadgetConfig};
use protocol::{ControlRequest, Endpoint, HID_INTERFACE, HID_SET_REPORT, LinkSpeed};
use std::sync::Arc;

/// A bound gadget on a loopback transport, with the host side exposed
pub struct Harness {
    pub gadget: Gadget,
    pub transport: Arc<LoopbackTransport>,
    pub registrar: Arc<MockRegistrar>,
    pub events: EventReceiver,
}

pub fn bind() -> Harness {
    bind_with(&GadgetConfig::default(), LinkSpeed::Full)
}

pub fn bind_with(config: &GadgetConfig, speed: LinkSpeed) -> Harness {
    let transport = Arc::new(LoopbackTransport::new(speed));
    transport.record_submissions(true);
    let registrar = Arc::new(MockRegistrar::default());
    let (sender, events) = create_event_channel(4096);
    let gadget = Gadget::bind(config, transport.clone(), registrar.clone(), sender)
        .expect("bind gadget");
    Harness {
        gadget,
        transport,
        registrar,
        events,
    }
}

impl Harness {
    /// Host completes the oldest isochronous transfer
    pub fn complete_audio(&self) -> bool {
        match self.transport.take(Endpoint::AudioIn) {
            Some(transfer) => {
                self.gadget.complete(Completion::completed(transfer));
                true
            }
            None => false,
        }
    }

    /// Host waits for the next outbound report, acknowledges it and returns
    /// its payload
    pub fn ack_report(&self) -> Option<Vec<u8>> {
        let transfer = self
            .transport
            .wait_take(Endpoint::HidIn, DEFAULT_TEST_TIMEOUT)?;
        let payload = transfer.payload().to_vec();
        self.gadget.complete(Completion::completed(transfer));
        Some(payload)
    }

    /// Host sends `report` with a SET_REPORT control transfer
    pub fn set_report(&self, report: &[u8]) {
        let req = ControlRequest::new(
            0x21,
            HID_SET_REPORT,
            0x0200 | u16::from(report[0]),
            u16::from(HID_INTERFACE),
            report.len() as u16,
        );
        match self.gadget.setup(&req).expect("SET_REPORT accepted") {
            ControlOutcome::Receive { sink, length } => {
                assert_eq!(length, report.len());
                self.gadget.control_data(sink, report);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    /// Every event raised so far
    pub fn drain_events(&self) -> Vec<GadgetEvent> {
        self.events.drain()
    }
}
