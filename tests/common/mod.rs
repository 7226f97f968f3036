#![allow(dead_code)]

use std::time::Duration;

use bytes::Bytes;
use llcp::mac::pipe::{self, PipeMac};
use llcp::protocol::{Parameter, PduType};
use llcp::{Link, LinkConfig, Mac, MacLink, MacLinkHandle, MacRole, Pdu, PduBody, Sap};

/// Rounds of SYMM a scripted peer sends before giving up on an answer.
const MAX_ROUNDS: usize = 500;

pub fn test_config() -> LinkConfig {
    LinkConfig {
        symm_delay: Duration::from_millis(2),
        connect_timeout: Some(Duration::from_secs(2)),
        resolve_timeout: Duration::from_secs(2),
        ..LinkConfig::default()
    }
}

pub fn sap(value: u8) -> Sap {
    Sap::new(value).unwrap()
}

/// Initiator side written by hand, facing a link running as target.
pub struct ScriptedPeer {
    mac: PipeMac,
}

impl ScriptedPeer {
    /// Start `link` as target and complete the PAX exchange.
    pub fn start(link: Link) -> (Self, MacLinkHandle) {
        let (ours, theirs) = pipe::pair();
        let handle = MacLink::new(theirs, link)
            .unwrap()
            .spawn(MacRole::Target)
            .unwrap();

        let mut mac = ours;
        mac.activate(MacRole::Initiator).unwrap();
        let mut peer = Self { mac };

        let pax = Pdu::new(
            Sap::LINK_MANAGEMENT,
            Sap::LINK_MANAGEMENT,
            PduBody::Pax(vec![
                Parameter::Version(llcp::protocol::LLCP_VERSION),
                Parameter::Miux(0),
                Parameter::Lto(100),
            ]),
        );
        let answer = peer.send(&pax);
        assert_eq!(answer.pdu_type(), PduType::Pax);
        (peer, handle)
    }

    /// Send raw bytes and return the raw answer.
    pub fn send_raw(&mut self, frame: &[u8]) -> Bytes {
        self.mac.exchange(frame).unwrap()
    }

    /// Send one PDU and decode the answer.
    pub fn send(&mut self, pdu: &Pdu) -> Pdu {
        let frame = pdu.encode().unwrap();
        Pdu::decode(self.send_raw(&frame)).unwrap()
    }

    /// Answer SYMM until the link sends something else.
    pub fn next_non_symm(&mut self) -> Pdu {
        for _ in 0..MAX_ROUNDS {
            let pdu = self.send(&Pdu::symm());
            if pdu.pdu_type() != PduType::Symm {
                return pdu;
            }
        }
        panic!("link stayed idle for {MAX_ROUNDS} rounds");
    }

    /// Send `pdu`; if the link answers SYMM keep turning until it doesn't.
    pub fn request(&mut self, pdu: &Pdu) -> Pdu {
        let answer = self.send(pdu);
        if answer.pdu_type() == PduType::Symm {
            self.next_non_symm()
        } else {
            answer
        }
    }

    /// Turn the link `rounds` times and collect whatever it sends.
    pub fn idle(&mut self, rounds: usize) -> Vec<Pdu> {
        (0..rounds)
            .map(|_| self.send(&Pdu::symm()))
            .filter(|pdu| pdu.pdu_type() != PduType::Symm)
            .collect()
    }

    /// Send link DISC and wait for the target to stop.
    pub fn finish(mut self, handle: MacLinkHandle) {
        let disc = Pdu::new(Sap::LINK_MANAGEMENT, Sap::LINK_MANAGEMENT, PduBody::Disc)
            .encode()
            .unwrap();
        // The target stops without answering.
        assert!(self.mac.exchange(&disc).is_err());
        handle.join().unwrap();
    }
}
