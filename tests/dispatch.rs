mod common;

use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::unbounded;
use llcp::protocol::{DmReason, FrameReject, Parameter, PduType};
use llcp::{Link, Pdu, PduBody, Sap, Service};

use common::{ScriptedPeer, sap, test_config};

fn information(dsap: Sap, ssap: Sap, ns: u8, nr: u8, payload: &'static [u8]) -> Pdu {
    Pdu::new(
        dsap,
        ssap,
        PduBody::I {
            ns,
            nr,
            payload: Bytes::from_static(payload),
        },
    )
}

#[test]
fn pax_answer_carries_link_parameters() {
    let link = Link::new(test_config());
    link.register(
        Service::new(|_conn| {})
            .with_uri("urn:nfc:sn:snep")
            .with_sap(Sap::SNEP),
    )
    .unwrap();

    let (peer, handle) = ScriptedPeer::start(link.clone());
    let remote = link.remote_parameters().expect("PAX applied");
    assert_eq!(remote.miu, 128);
    assert_eq!(remote.lto, 100);
    assert!(link.is_active());
    assert_eq!(link.metrics().sent(PduType::Pax), 1);

    peer.finish(handle);
    assert!(!link.is_active());
    assert_eq!(link.remote_parameters(), None);
}

#[test]
fn snl_request_answered_with_sdres() {
    let link = Link::new(test_config());
    link.register(
        Service::new(|_conn| {})
            .with_uri("urn:nfc:sn:snep")
            .with_sap(Sap::SNEP),
    )
    .unwrap();
    let (mut peer, handle) = ScriptedPeer::start(link);

    let request = Pdu::new(
        Sap::SDP,
        Sap::SDP,
        PduBody::Snl(vec![Parameter::SdReq {
            tid: 1,
            uri: "urn:nfc:sn:snep".into(),
        }]),
    );
    let answer = peer.send_raw(&request.encode().unwrap());
    assert_eq!(answer.as_ref(), &[0x06, 0x41, 0x09, 0x02, 0x01, 0x04]);

    let miss = Pdu::new(
        Sap::SDP,
        Sap::SDP,
        PduBody::Snl(vec![Parameter::SdReq {
            tid: 2,
            uri: "urn:nfc:sn:nothing".into(),
        }]),
    );
    let answer = peer.send(&miss);
    assert_eq!(
        answer.body,
        PduBody::Snl(vec![Parameter::SdRes { tid: 2, sap: 0 }])
    );

    peer.finish(handle);
}

#[test]
fn connect_to_unbound_sap_gets_dm() {
    let link = Link::new(test_config());
    let (mut peer, handle) = ScriptedPeer::start(link);

    let connect = Pdu::new(sap(0x10), sap(0x20), PduBody::Connect(vec![]));
    let answer = peer.request(&connect);
    assert_eq!(answer.dsap, sap(0x20));
    assert_eq!(answer.ssap, sap(0x10));
    assert_eq!(answer.body, PduBody::Dm(DmReason::NoServiceBound));
    assert_eq!(answer.encode().unwrap().as_ref(), &[0x81, 0xd0, 0x02]);

    let by_name = Pdu::new(
        Sap::SDP,
        sap(0x20),
        PduBody::Connect(vec![Parameter::ServiceName("urn:nfc:sn:nothing".into())]),
    );
    let answer = peer.request(&by_name);
    assert_eq!(answer.body, PduBody::Dm(DmReason::NoServiceBound));

    peer.finish(handle);
}

#[test]
fn disc_without_connection_gets_dm() {
    let link = Link::new(test_config());
    let (mut peer, handle) = ScriptedPeer::start(link);

    let disc = Pdu::new(sap(0x20), sap(0x21), PduBody::Disc);
    let answer = peer.request(&disc);
    assert_eq!(answer.dsap, sap(0x21));
    assert_eq!(answer.ssap, sap(0x20));
    assert_eq!(answer.body, PduBody::Dm(DmReason::NoActiveConnection));

    peer.finish(handle);
}

#[test]
fn information_without_connection_gets_frmr() {
    let link = Link::new(test_config());
    let (mut peer, handle) = ScriptedPeer::start(link);

    let answer = peer.request(&information(sap(0x20), sap(0x21), 3, 0, b"lost"));
    let PduBody::Frmr(reject) = answer.body else {
        panic!("expected FRMR, got {answer:?}");
    };
    assert_eq!(reject.flags, FrameReject::W);
    assert_eq!(reject.ptype, PduType::I.as_u8());
    assert_eq!(reject.sequence, 0x30);

    peer.finish(handle);
}

#[test]
fn reserved_pdu_type_is_dropped() {
    let link = Link::new(test_config());
    let (mut peer, handle) = ScriptedPeer::start(link.clone());

    let answer = peer.send_raw(&[0x02, 0x80]);
    assert_eq!(answer.as_ref(), &[0x00, 0x00]);
    assert_eq!(link.metrics().malformed, 1);

    peer.finish(handle);
}

#[test]
fn sends_stop_at_remote_window() {
    let link = Link::new(test_config());
    let server = link
        .register(Service::new(|conn| {
            for index in 0..3u8 {
                if conn.send(vec![index]).is_err() {
                    return;
                }
            }
        }))
        .unwrap();
    let (mut peer, handle) = ScriptedPeer::start(link);

    let connect = Pdu::new(server, sap(0x20), PduBody::Connect(vec![Parameter::Rw(2)]));
    let cc = peer.request(&connect);
    assert_eq!(cc.pdu_type(), PduType::Cc);
    assert_eq!(cc.ssap, server);

    let first = peer.next_non_symm();
    let second = peer.next_non_symm();
    assert!(matches!(first.body, PduBody::I { ns: 0, nr: 0, .. }));
    assert!(matches!(second.body, PduBody::I { ns: 1, nr: 0, .. }));

    // The third frame waits for an acknowledgement.
    assert!(peer.idle(20).is_empty());

    let third = peer.request(&Pdu::new(server, sap(0x20), PduBody::Rr { nr: 2 }));
    let PduBody::I { ns, payload, .. } = third.body else {
        panic!("expected I, got {third:?}");
    };
    assert_eq!(ns, 2);
    assert_eq!(payload.as_ref(), &[2]);

    // The handler returned, so the connection closes.
    let disc = peer.next_non_symm();
    assert_eq!(disc.body, PduBody::Disc);

    peer.finish(handle);
}

#[test]
fn receiver_not_ready_holds_transmission() {
    let link = Link::new(test_config());
    let server = link
        .register(Service::new(|conn| {
            if conn.send(&b"held"[..]).is_ok() {
                let _ = conn.recv(None);
            }
        }))
        .unwrap();
    let (mut peer, handle) = ScriptedPeer::start(link);

    // CONNECT and RNR arrive together, so the peer is busy before any I.
    let batch = Pdu::new(
        Sap::LINK_MANAGEMENT,
        Sap::LINK_MANAGEMENT,
        PduBody::Agf(vec![
            Pdu::new(server, sap(0x20), PduBody::Connect(vec![])),
            Pdu::new(server, sap(0x20), PduBody::Rnr { nr: 0 }),
        ]),
    );
    let cc = peer.request(&batch);
    assert_eq!(cc.pdu_type(), PduType::Cc);
    assert!(peer.idle(20).is_empty());

    let information = peer.request(&Pdu::new(server, sap(0x20), PduBody::Rr { nr: 0 }));
    assert!(matches!(information.body, PduBody::I { ns: 0, .. }));

    let dm = peer.request(&Pdu::new(server, sap(0x20), PduBody::Disc));
    assert_eq!(dm.body, PduBody::Dm(DmReason::Disconnected));

    peer.finish(handle);
}

#[test]
fn duplicate_information_delivered_once() {
    let link = Link::new(test_config());
    let (tx, rx) = unbounded();
    let server = link
        .register(
            Service::new(move |conn| {
                while let Ok((payload, _)) = conn.recv(None) {
                    let _ = tx.send(payload);
                }
            })
            .with_rw(4),
        )
        .unwrap();
    let (mut peer, handle) = ScriptedPeer::start(link);

    let cc = peer.request(&Pdu::new(server, sap(0x20), PduBody::Connect(vec![])));
    assert_eq!(cc.body, PduBody::Cc(vec![Parameter::Miux(0), Parameter::Rw(4)]));

    let mut answers = vec![
        peer.send(&information(server, sap(0x20), 0, 0, b"a")),
        peer.send(&information(server, sap(0x20), 0, 0, b"a")),
        peer.send(&information(server, sap(0x20), 1, 0, b"b")),
    ];

    let timeout = Duration::from_secs(2);
    assert_eq!(rx.recv_timeout(timeout).unwrap().as_ref(), b"a");
    assert_eq!(rx.recv_timeout(timeout).unwrap().as_ref(), b"b");
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    // Both frames are acknowledged once consumed.
    answers.extend(peer.idle(50));
    let acked = answers.iter().rev().find_map(|pdu| match pdu.body {
        PduBody::Rr { nr } => Some(nr),
        _ => None,
    });
    assert_eq!(acked, Some(2));

    peer.finish(handle);
}

#[test]
fn connect_by_name_through_sdp() {
    let link = Link::new(test_config());
    let (tx, rx) = unbounded();
    link.register(
        Service::new(move |conn| {
            let _ = tx.send(conn.remote_sap());
        })
        .with_uri("urn:nfc:sn:handover")
        .with_sap(sap(0x15)),
    )
    .unwrap();
    let (mut peer, handle) = ScriptedPeer::start(link.clone());

    let connect = Pdu::new(
        Sap::SDP,
        sap(0x20),
        PduBody::Connect(vec![Parameter::ServiceName("urn:nfc:sn:handover".into())]),
    );
    let cc = peer.request(&connect);
    assert_eq!(cc.pdu_type(), PduType::Cc);
    assert_eq!(cc.ssap, sap(0x15));
    assert_eq!(cc.dsap, sap(0x20));
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Some(sap(0x20)));

    let disc = peer.next_non_symm();
    assert_eq!(disc.body, PduBody::Disc);
    assert_eq!(link.metrics().connections_opened, 1);

    peer.finish(handle);
}
