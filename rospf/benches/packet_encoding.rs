//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::hint::black_box;
use std::net::Ipv4Addr;

use criterion::{Criterion, criterion_group, criterion_main};
use rospf::ospfv2::packet::lsa::{
    LsaBody, LsaRouter, LsaRouterFlags, LsaRouterLink, LsaRouterLinkType,
};
use rospf::ospfv2::packet::{Hello, Options, PacketHdr};
use rospf::packet::lsa::Lsa;
use rospf::packet::{Packet, PacketType};
use rospf::version::Ospfv2;

fn hello_packet() -> Packet<Ospfv2> {
    Packet::Hello(Hello {
        hdr: PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: Ipv4Addr::new(1, 1, 1, 1),
            area_id: Ipv4Addr::new(0, 0, 0, 0),
            auth_seqno: None,
        },
        network_mask: Ipv4Addr::new(255, 255, 255, 0),
        hello_interval: 10,
        options: Options::E,
        priority: 1,
        dead_interval: 40,
        dr: None,
        bdr: None,
        neighbors: (1..=32)
            .map(|i| Ipv4Addr::new(10, 0, 0, i))
            .collect(),
    })
}

fn router_lsa() -> LsaBody {
    let links = (1..=32)
        .map(|i| {
            LsaRouterLink::new(
                LsaRouterLinkType::PointToPoint,
                Ipv4Addr::new(10, 0, i, 2),
                Ipv4Addr::new(10, 0, i, 1),
                10,
            )
        })
        .collect();
    LsaBody::Router(LsaRouter {
        flags: LsaRouterFlags::B,
        links,
    })
}

fn criterion_benchmark(c: &mut Criterion) {
    let packet = hello_packet();
    c.bench_function("encode hello", |b| {
        b.iter(|| black_box(&packet).encode(None))
    });

    let body = router_lsa();
    c.bench_function("encode router-lsa", |b| {
        b.iter(|| {
            Lsa::<Ospfv2>::new(
                1,
                Some(Options::E),
                black_box(Ipv4Addr::new(1, 1, 1, 1)),
                Ipv4Addr::new(1, 1, 1, 1),
                0x80000001,
                body.clone(),
            )
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
