//! Criterion benchmarks for salvage-core hot paths.
//!
//! Covers: ratchet stepping and per-asset address encoding, the two costs
//! that dominate a 10 000-key escrow scan.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use salvage_core::cashaddr::{CashAddr, CashAddrKind};
use salvage_core::{AddressCodec, AssetKind, ChainKeyState, ChainSecret, RawPrivateKey};

fn sample_root() -> ChainSecret {
    let mut bytes = [0u8; 32];
    bytes[31] = 1;
    ChainSecret::from_bytes(bytes)
}

fn bench_ratchet(c: &mut Criterion) {
    c.bench_function("ratchet_step", |b| {
        let mut state = ChainKeyState::new(sample_root());
        b.iter(|| state.step())
    });

    c.bench_function("ratchet_take_100", |b| {
        b.iter(|| ChainKeyState::new(black_box(sample_root())).take(100))
    });
}

fn bench_encode(c: &mut Criterion) {
    let codec = AddressCodec::new();
    let key = RawPrivateKey::from_bytes([0x42; 32]);

    for asset in AssetKind::ALL {
        c.bench_function(&format!("encode_{}", asset.ticker().to_lowercase()), |b| {
            b.iter(|| codec.encode(black_box(asset), black_box(&key)))
        });
    }
}

fn bench_cashaddr(c: &mut Criterion) {
    let encoded = CashAddr::new(CashAddrKind::P2pkh, [0x5A; 20]).encode();

    c.bench_function("cashaddr_decode", |b| {
        b.iter(|| CashAddr::decode(black_box(&encoded)))
    });
}

criterion_group!(benches, bench_ratchet, bench_encode, bench_cashaddr);
criterion_main!(benches);
