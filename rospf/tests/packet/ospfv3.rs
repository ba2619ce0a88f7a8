//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use bytes::Bytes;
use const_addrs::{ip4, ip6};
use ipnetwork::IpNetwork;
use maplit::btreeset;
use rospf::ospfv3::packet::lsa::*;
use rospf::ospfv3::packet::*;
use rospf::packet::auth::{AuthDecodeCtx, AuthEncodeCtx, AuthMethod};
use rospf::packet::lsa::Lsa;
use rospf::packet::{DbDescFlags, Packet, PacketType};
use rospf::version::Ospfv3;
use rospf_utils::crypto::CryptoAlgo;
use rospf_utils::ip::AddressFamily;
use rospf_utils::keychain::Key;

const SRC_ADDR: Ipv6Addr = Ipv6Addr::UNSPECIFIED;

//
// Helper functions.
//

// Encodes the packet and feeds the wire image back through the decoder.
// OSPFv3 checksums use the IPv6 pseudo-header and are handled by the I/O
// layer, so only the structure is verified here.
fn test_packet_wire(packet: &Packet<Ospfv3>) -> Bytes {
    let bytes = packet.encode(None);

    // The advertised packet length must match the encoding.
    let pkt_len = u16::from_be_bytes([bytes[2], bytes[3]]);
    assert_eq!(pkt_len as usize, bytes.len());

    // The wire image must decode back to the original packet.
    let mut buf = bytes.clone();
    let decoded = Packet::decode(AddressFamily::Ipv6, &mut buf, None).unwrap();
    assert_eq!(*packet, decoded);

    bytes
}

fn net6(s: &str) -> IpNetwork {
    s.parse().unwrap()
}

fn test_lsa_wire(lsa: &Lsa<Ospfv3>) {
    let mut bytes = lsa.raw.clone();
    let decoded = Lsa::decode(AddressFamily::Ipv6, &mut bytes).unwrap();
    assert_eq!(lsa.hdr, decoded.hdr);
    assert_eq!(lsa.body, decoded.body);
    assert!(decoded.validate().is_ok());
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
            instance_id: 0,
            auth_seqno: None,
        },
        iface_id: 7,
        priority: 1,
        options: Options::R | Options::V6 | Options::E,
        hello_interval: 10,
        dead_interval: 40,
        dr: None,
        bdr: None,
        neighbors: btreeset![ip4!("1.1.1.1")],
    });

    let bytes = test_packet_wire(&packet);

    // Fixed header offsets: version, type, router-id, area-id, instance-id.
    assert_eq!(bytes[0], 3);
    assert_eq!(bytes[1], 0x01);
    assert_eq!(&bytes[4..8], &[2, 2, 2, 2]);
    assert_eq!(&bytes[8..12], &[0, 0, 0, 1]);
    assert_eq!(bytes[14], 0);
    // Hello body: interface ID.
    assert_eq!(&bytes[16..20], &[0, 0, 0, 7]);
}

#[test]
fn hello_hmac_sha256_auth() {
    let packet = Packet::Hello(Hello {
        hdr: PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: ip4!("1.1.1.1"),
            area_id: ip4!("0.0.0.0"),
            instance_id: 0,
            auth_seqno: None,
        },
        iface_id: 3,
        priority: 1,
        options: Options::R | Options::V6 | Options::E | Options::AT,
        hello_interval: 3,
        dead_interval: 12,
        dr: Some(ip4!("3.3.3.3").into()),
        bdr: None,
        neighbors: btreeset![ip4!("2.2.2.2")],
    });

    // Encode with the RFC 7166 authentication trailer.
    let key = Key::new(1, CryptoAlgo::HmacSha256, b"SECRET".to_vec());
    let seqno = Arc::new(AtomicU64::new(7));
    let bytes = packet
        .encode(Some(AuthEncodeCtx::new(&key, &seqno, SRC_ADDR.into())));

    // The trailer lives past the advertised packet length.
    let pkt_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    assert_eq!(bytes.len(), pkt_len + 16 + 32);

    // The authenticated image must decode with the same key.
    let method = AuthMethod::ManualKey(key);
    let auth = AuthDecodeCtx::new(&method, SRC_ADDR.into());
    let mut buf = bytes.clone();
    let decoded =
        Packet::decode(AddressFamily::Ipv6, &mut buf, Some(auth)).unwrap();
    let Packet::Hello(hello) = decoded else {
        panic!("unexpected packet type");
    };
    assert_eq!(hello.hdr.auth_seqno, Some(7));
}

#[test]
fn dbdesc_wire_format() {
    let packet = Packet::DbDesc(DbDesc {
        hdr: PacketHdr {
            pkt_type: PacketType::DbDesc,
            router_id: ip4!("1.1.1.1"),
            area_id: ip4!("0.0.0.0"),
            instance_id: 0,
            auth_seqno: None,
        },
        options: Options::R | Options::V6 | Options::E,
        mtu: 1500,
        dd_flags: DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
        dd_seq_no: 99,
        lsa_hdrs: vec![],
    });

    let bytes = test_packet_wire(&packet);
    assert_eq!(bytes[1], 0x02);
    assert_eq!(u16::from_be_bytes([bytes[20], bytes[21]]), 1500);
    assert_eq!(bytes[23], 0x07);
}

#[test]
fn lsa_router_wire_format() {
    let lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.0"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::Router(LsaRouter::new(
            LsaRouterFlags::B,
            Options::R | Options::V6 | Options::E,
            vec![LsaRouterLink::new(
                LsaRouterLinkType::PointToPoint,
                10,
                7,
                9,
                ip4!("2.2.2.2"),
            )],
        )),
    );

    test_lsa_wire(&lsa);
    // LS type 0x2001.
    assert_eq!(&lsa.raw[2..4], &[0x20, 0x01]);
    // One 16-byte link after the 4-byte body header.
    assert_eq!(lsa.hdr.length, 20 + 4 + 16);
}

#[test]
fn lsa_network_wire_format() {
    let lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.7"),
        ip4!("3.3.3.3"),
        0x80000001,
        LsaBody::Network(LsaNetwork::new(
            Options::R | Options::V6 | Options::E,
            btreeset![ip4!("1.1.1.1"), ip4!("2.2.2.2"), ip4!("3.3.3.3")],
        )),
    );

    test_lsa_wire(&lsa);
    assert_eq!(&lsa.raw[2..4], &[0x20, 0x02]);
}

#[test]
fn lsa_inter_area_prefix_wire_format() {
    let lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.1"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::InterAreaPrefix(LsaInterAreaPrefix::new(
            20,
            PrefixOptions::empty(),
            net6("2001:db8:1::/64"),
        )),
    );

    test_lsa_wire(&lsa);
    assert_eq!(&lsa.raw[2..4], &[0x20, 0x03]);
    // Prefix length octet.
    assert_eq!(lsa.raw[24], 64);
    // /64 prefixes are encoded in two 32-bit words.
    assert_eq!(lsa.hdr.length, 20 + 8 + 8);
}

#[test]
fn lsa_external_wire_format() {
    let lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.5"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::AsExternal(LsaAsExternal::new(
            LsaAsExternalFlags::E | LsaAsExternalFlags::T,
            20,
            PrefixOptions::empty(),
            net6("2001:db8:ffff::/48"),
            None,
            Some(100),
            None,
            None,
        )),
    );

    test_lsa_wire(&lsa);
    assert_eq!(&lsa.raw[2..4], &[0x40, 0x05]);
}

#[test]
fn lsa_nssa_wire_format() {
    let mut prefix_options = PrefixOptions::empty();
    prefix_options.insert(PrefixOptions::P);
    let lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.9"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::Nssa(LsaAsExternal::new(
            LsaAsExternalFlags::E | LsaAsExternalFlags::F,
            20,
            prefix_options,
            net6("2001:db8:2::/64"),
            Some(ip6!("2001:db8:1::4").into()),
            None,
            None,
            None,
        )),
    );

    test_lsa_wire(&lsa);
    // NSSA LSAs are area-scoped with function code 7.
    assert_eq!(&lsa.raw[2..4], &[0x20, 0x07]);
}

#[test]
fn lsa_link_wire_format() {
    let lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.7"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::Link(LsaLink::new(
            1,
            Options::R | Options::V6 | Options::E,
            ip6!("fe80::1").into(),
            vec![LsaLinkPrefix::new(
                PrefixOptions::empty(),
                net6("2001:db8:1::/64"),
            )],
        )),
    );

    test_lsa_wire(&lsa);
    // Link-LSAs are link-scoped with function code 8.
    assert_eq!(&lsa.raw[2..4], &[0x00, 0x08]);
}

#[test]
fn lsa_intra_area_prefix_wire_format() {
    let lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.0"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::IntraAreaPrefix(LsaIntraAreaPrefix::new(
            LsaFunctionCode::Router.lsa_type(),
            ip4!("0.0.0.0"),
            ip4!("1.1.1.1"),
            vec![
                LsaIntraAreaPrefixEntry::new(
                    PrefixOptions::empty(),
                    net6("2001:db8:1::/64"),
                    10,
                ),
                LsaIntraAreaPrefixEntry::new(
                    PrefixOptions::LA,
                    net6("2001:db8::1/128"),
                    0,
                ),
            ],
        )),
    );

    test_lsa_wire(&lsa);
    assert_eq!(&lsa.raw[2..4], &[0x20, 0x09]);
    // Prefix count.
    assert_eq!(&lsa.raw[20..22], &[0, 2]);
}

#[test]
fn lsa_grace_wire_format() {
    let lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.0"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::Grace(LsaGrace {
            grace_period: Some(60),
            gr_reason: Some(1),
        }),
    );

    test_lsa_wire(&lsa);
    // Grace-LSAs are link-scoped with function code 11.
    assert_eq!(&lsa.raw[2..4], &[0x00, 0x0b]);
}

#[test]
fn lsa_unknown_body_retained() {
    // An LSA of unknown function code keeps its body bytes so it can be
    // stored and flooded as opaque data.
    let mut lsa = Lsa::<Ospfv3>::new(
        1,
        None,
        ip4!("0.0.0.1"),
        ip4!("1.1.1.1"),
        0x80000001,
        LsaBody::Grace(LsaGrace {
            grace_period: Some(60),
            gr_reason: Some(1),
        }),
    );

    // Rewrite the LS type to an unknown area-scope code and decode.
    let mut raw = lsa.raw.to_vec();
    raw[2] = 0x20;
    raw[3] = 0x42;
    // Clear the checksum so validation is skipped in testing mode.
    raw[16] = 0;
    raw[17] = 0;
    let mut buf = Bytes::copy_from_slice(&raw);
    let decoded = Lsa::<Ospfv3>::decode(AddressFamily::Ipv6, &mut buf).unwrap();
    let LsaBody::Unknown(unknown) = &decoded.body else {
        panic!("expected unknown LSA body");
    };
    assert_eq!(unknown.data.len(), raw.len() - 20);
    lsa.raw = Bytes::copy_from_slice(&raw);
}
