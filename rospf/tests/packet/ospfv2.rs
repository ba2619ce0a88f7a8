//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use bytes::Bytes;
use const_addrs::ip4;
use maplit::btreeset;
use rospf::ospfv2::packet::lsa::*;
use rospf::ospfv2::packet::lsa_opaque::*;
use rospf::ospfv2::packet::*;
use rospf::packet::auth::{AuthDecodeCtx, AuthEncodeCtx, AuthMethod};
use rospf::packet::lsa::{Lsa, LsaKey};
use rospf::packet::{DbDescFlags, Packet, PacketHdrVersion, PacketType};
use rospf::version::Ospfv2;
use rospf_utils::crypto::CryptoAlgo;
use rospf_utils::ip::AddressFamily;
use rospf_utils::keychain::Key;

const SRC_ADDR: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

//
// Helper functions.
//

// Encodes the packet and feeds the wire image back through the decoder,
// verifying the checksum and the decoded contents along the way.
fn test_packet_wire(packet: &Packet<Ospfv2>) -> Bytes {
    let bytes = packet.encode(None);

    // The advertised packet length must match the encoding.
    let pkt_len = u16::from_be_bytes([bytes[2], bytes[3]]);
    assert_eq!(pkt_len as usize, bytes.len());

    // The packet checksum must verify.
    assert!(PacketHdr::verify_cksum(bytes.as_ref()).is_ok());

    // The wire image must decode back to the original packet.
    let mut buf = bytes.clone();
    let decoded = Packet::decode(AddressFamily::Ipv4, &mut buf, None).unwrap();
    assert_eq!(*packet, decoded);

    bytes
}

fn test_lsa_wire(lsa: &Lsa<Ospfv2>) {
    // The LSA raw image must carry a valid checksum and decode back to the
    // original contents.
    let mut bytes = lsa.raw.clone();
    let decoded = Lsa::decode(AddressFamily::Ipv4, &mut bytes).unwrap();
    assert_eq!(lsa.hdr, decoded.hdr);
    assert_eq!(lsa.body, decoded.body);
    assert!(decoded.validate().is_ok());
}

fn auth_key(algo: CryptoAlgo) -> Key {
    Key::new(1, algo, b"SECRET".to_vec())
}

//
// Tests.
//

#[test]
fn hello_wire_format() {
    let packet = Packet::Hello(Hello {
        hdr: PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: ip4!("2.2.2.2"),
            area_id: ip4!("0.0.0.1"),
            auth_seqno: None,
        },
        network_mask: ip4!("255.255.255.0"),
        hello_interval: 10,
        options: Options::E,
        priority: 1,
        dead_interval: 40,
        dr: None,
        bdr: None,
        neighbors: btreeset![ip4!("1.1.1.1")],
    });

    let bytes = test_packet_wire(&packet);

    // Fixed header offsets: version, type, router-id, area-id, autype.
    assert_eq!(bytes[0], 2);
    assert_eq!(bytes[1], 0x01);
    assert_eq!(&bytes[4..8], &[2, 2, 2, 2]);
    assert_eq!(&bytes[8..12], &[0, 0, 0, 1]);
    assert_eq!(&bytes[14..16], &[0, 0]);
    // Hello body: network mask and hello interval.
    assert_eq!(&bytes[24..28], &[255, 255, 255, 0]);
    assert_eq!(u16::from_be_bytes([bytes[28], bytes[29]]), 10);
}

#[test]
fn hello_md5_auth() {
    let packet = Packet::Hello(Hello {
        hdr: PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: ip4!("1.1.1.1"),
            area_id: ip4!("0.0.0.0"),
            auth_seqno: None,
        },
        network_mask: ip4!("255.255.255.0"),
        hello_interval: 3,
        options: Options::E,
        priority: 1,
        dead_interval: 12,
        dr: Some(ip4!("10.0.1.3").into()),
        bdr: None,
        neighbors: btreeset![ip4!("2.2.2.2")],
    });

    // Encode with keyed-MD5 authentication.
    let key = auth_key(CryptoAlgo::Md5);
    let seqno = Arc::new(AtomicU64::new(100));
    let bytes = packet
        .encode(Some(AuthEncodeCtx::new(&key, &seqno, SRC_ADDR.into())));

    // AuType must be Cryptographic and the digest appended past the packet
    // length.
    assert_eq!(u16::from_be_bytes([bytes[14], bytes[15]]), 2);
    let pkt_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    assert_eq!(bytes.len(), pkt_len + 16);

    // The authenticated image must decode with the same key and yield the
    // carried sequence number.
    let method = AuthMethod::ManualKey(key);
    let auth = AuthDecodeCtx::new(&method, SRC_ADDR.into());
    let mut buf = bytes.clone();
    let decoded =
        Packet::decode(AddressFamily::Ipv4, &mut buf, Some(auth)).unwrap();
    let Packet::Hello(hello) = decoded else {
        panic!("unexpected packet type");
    };
    assert_eq!(hello.hdr.auth_seqno, Some(100));

    // A corrupted digest must be rejected.
    let mut tampered = bytes.to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0xff;
    let method = AuthMethod::ManualKey(auth_key(CryptoAlgo::Md5));
    let auth = AuthDecodeCtx::new(&method, SRC_ADDR.into());
    let mut buf = Bytes::copy_from_slice(&tampered);
    assert!(
        Packet::decode(AddressFamily::Ipv4, &mut buf, Some(auth)).is_err()
    );
}

#[test]
fn dbdesc_wire_format() {
    let lsa = Lsa::<Ospfv2>::new(
        1,
        Some(Options::E),
        ip4!("1.1.1.1"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::Router(LsaRouter {
            flags: LsaRouterFlags::empty(),
            links: vec![],
        }),
    );

    let packet = Packet::DbDesc(DbDesc {
        hdr: PacketHdr {
            pkt_type: PacketType::DbDesc,
            router_id: ip4!("1.1.1.1"),
            area_id: ip4!("0.0.0.0"),
            auth_seqno: None,
        },
        mtu: 1500,
        options: Options::E | Options::O,
        dd_flags: DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
        dd_seq_no: 1234,
        lsa_hdrs: vec![lsa.hdr],
    });

    let bytes = test_packet_wire(&packet);
    assert_eq!(bytes[1], 0x02);
    assert_eq!(u16::from_be_bytes([bytes[24], bytes[25]]), 1500);
    assert_eq!(bytes[27], 0x07);
}

#[test]
fn lsrequest_wire_format() {
    let packet = Packet::LsRequest(LsRequest {
        hdr: PacketHdr {
            pkt_type: PacketType::LsRequest,
            router_id: ip4!("1.1.1.1"),
            area_id: ip4!("0.0.0.0"),
            auth_seqno: None,
        },
        entries: vec![LsaKey {
            lsa_type: LsaType(1),
            adv_rtr: ip4!("2.2.2.2"),
            lsa_id: ip4!("2.2.2.2"),
        }],
    });

    let bytes = test_packet_wire(&packet);
    assert_eq!(bytes[1], 0x03);
    // LS type is encoded as a 32-bit value.
    assert_eq!(&bytes[24..28], &[0, 0, 0, 1]);
}

#[test]
fn lsupdate_and_lsack_wire_format() {
    let lsa = Lsa::<Ospfv2>::new(
        1,
        Some(Options::E),
        ip4!("1.1.1.1"),
        ip4!("1.1.1.1"),
        0x80000002,
        LsaBody::Router(LsaRouter {
            flags: LsaRouterFlags::B,
            links: vec![LsaRouterLink::new(
                LsaRouterLinkType::PointToPoint,
                ip4!("2.2.2.2"),
                ip4!("10.0.1.1"),
                10,
            )],
        }),
    );

    let packet = Packet::LsUpdate(LsUpdate {
        hdr: PacketHdr {
            pkt_type: PacketType::LsUpdate,
            router_id: ip4!("1.1.1.1"),
            area_id: ip4!("0.0.0.0"),
            auth_seqno: None,
        },
        lsas: vec![lsa.clone()],
    });
    let bytes = test_packet_wire(&packet);
    assert_eq!(bytes[1], 0x04);
    assert_eq!(&bytes[24..28], &[0, 0, 0, 1]);

    let packet = Packet::LsAck(LsAck {
        hdr: PacketHdr {
            pkt_type: PacketType::LsAck,
            router_id: ip4!("1.1.1.1"),
            area_id: ip4!("0.0.0.0"),
            auth_seqno: None,
        },
        lsa_hdrs: vec![lsa.hdr],
    });
    let bytes = test_packet_wire(&packet);
    assert_eq!(bytes[1], 0x05);
}

#[test]
fn lsa_router_wire_format() {
    let lsa = Lsa::<Ospfv2>::new(
        1,
        Some(Options::E),
        ip4!("1.1.1.1"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::Router(LsaRouter {
            flags: LsaRouterFlags::B | LsaRouterFlags::E,
            links: vec![
                LsaRouterLink::new(
                    LsaRouterLinkType::TransitNetwork,
                    ip4!("10.0.1.3"),
                    ip4!("10.0.1.1"),
                    10,
                ),
                LsaRouterLink::new(
                    LsaRouterLinkType::StubNetwork,
                    ip4!("172.16.1.0"),
                    ip4!("255.255.255.0"),
                    20,
                ),
            ],
        }),
    );

    test_lsa_wire(&lsa);
    // LS type and link count.
    assert_eq!(lsa.raw[3], 1);
    assert_eq!(u16::from_be_bytes([lsa.raw[22], lsa.raw[23]]), 2);
}

#[test]
fn lsa_network_wire_format() {
    let lsa = Lsa::<Ospfv2>::new(
        1,
        Some(Options::E),
        ip4!("10.0.1.3"),
        ip4!("3.3.3.3"),
        0x80000001,
        LsaBody::Network(LsaNetwork {
            mask: ip4!("255.255.255.0"),
            attached_rtrs: btreeset![
                ip4!("1.1.1.1"),
                ip4!("2.2.2.2"),
                ip4!("3.3.3.3")
            ],
        }),
    );

    test_lsa_wire(&lsa);
    assert_eq!(lsa.hdr.length, 20 + 4 + 12);
}

#[test]
fn lsa_summary_wire_format() {
    let lsa = Lsa::<Ospfv2>::new(
        1,
        Some(Options::E),
        ip4!("10.0.0.0"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::SummaryNetwork(LsaSummary {
            mask: ip4!("255.255.0.0"),
            metric: 20,
        }),
    );

    test_lsa_wire(&lsa);
    // 24-bit metric at the end of the body.
    assert_eq!(&lsa.raw[25..28], &[0, 0, 20]);
}

#[test]
fn lsa_external_wire_format() {
    // Type-5 and type-7 share the same body layout.
    for body in [
        LsaBody::AsExternal(LsaAsExternal {
            mask: ip4!("255.255.0.0"),
            flags: LsaAsExternalFlags::E,
            metric: 20,
            fwd_addr: None,
            tag: 0,
        }),
        LsaBody::Type7(LsaAsExternal {
            mask: ip4!("255.255.0.0"),
            flags: LsaAsExternalFlags::E,
            metric: 20,
            fwd_addr: Some(ip4!("10.0.1.4")),
            tag: 100,
        }),
    ] {
        let lsa = Lsa::<Ospfv2>::new(
            1,
            Some(Options::E),
            ip4!("10.1.0.0"),
            ip4!("1.1.1.1"),
            0x80000001,
            body,
        );
        test_lsa_wire(&lsa);
        // E-bit in the first body octet past the mask.
        assert_eq!(lsa.raw[24] & 0x80, 0x80);
    }
}

#[test]
fn lsa_grace_wire_format() {
    let opaque_lsa_id: Ipv4Addr = OpaqueLsaId::new(3, 0).into();
    let lsa = Lsa::<Ospfv2>::new(
        1,
        Some(Options::O),
        opaque_lsa_id,
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::OpaqueLink(LsaOpaque::Grace(LsaGrace {
            grace_period: Some(60),
            gr_reason: Some(1),
            addr: Some(ip4!("10.0.1.1")),
            unknown_tlvs: vec![],
        })),
    );

    test_lsa_wire(&lsa);
    // Opaque type 3 in the first LSA-ID octet.
    assert_eq!(lsa.raw[4], 3);
    // Grace period TLV right after the header.
    assert_eq!(&lsa.raw[20..24], &[0, 1, 0, 4]);
    assert_eq!(&lsa.raw[24..28], &[0, 0, 0, 60]);
}

#[test]
fn lsa_dna_bit() {
    let mut lsa = Lsa::<Ospfv2>::new(
        0x8000 | 100,
        Some(Options::E | Options::DC),
        ip4!("10.0.0.0"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::SummaryNetwork(LsaSummary {
            mask: ip4!("255.255.0.0"),
            metric: 20,
        }),
    );

    use rospf::packet::lsa::LsaHdrVersion;
    assert!(lsa.hdr.is_dna());
    assert_eq!(lsa.hdr.age(), 100);
    assert!(!lsa.hdr.is_maxage());

    // Flushing clears the DoNotAge bit.
    lsa.hdr.set_age(3600);
    assert!(!lsa.hdr.is_dna());
    assert!(lsa.hdr.is_maxage());
}

#[test]
fn decode_truncated_packet() {
    let lsa = Lsa::<Ospfv2>::new(
        1,
        Some(Options::E),
        ip4!("1.1.1.1"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::Router(LsaRouter {
            flags: LsaRouterFlags::empty(),
            links: vec![],
        }),
    );
    let packet = Packet::LsUpdate(LsUpdate {
        hdr: PacketHdr {
            pkt_type: PacketType::LsUpdate,
            router_id: ip4!("1.1.1.1"),
            area_id: ip4!("0.0.0.0"),
            auth_seqno: None,
        },
        lsas: vec![lsa],
    });
    let bytes = packet.encode(None);

    // Truncated images are rejected, not panicked on.
    for len in [1, 10, 23] {
        let mut buf = bytes.slice(0..len);
        assert!(
            Packet::decode(AddressFamily::Ipv4, &mut buf, None).is_err()
        );
    }
}

#[test]
fn prefix_mask_sanity() {
    // The wire mask of a prefix matches its ipnetwork form.
    let prefix: ipnetwork::Ipv4Network = "10.0.1.0/24".parse().unwrap();
    assert_eq!(prefix.mask(), ip4!("255.255.255.0"));
}
