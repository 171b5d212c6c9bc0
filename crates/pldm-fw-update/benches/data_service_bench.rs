//! Benchmarks for the firmware data service and instance id allocation

use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pldm_fw_update::prelude::*;
use pldm_fw_update::{plan_firmware_data, read_firmware_data};
use pldm_fw_wire::RequestFirmwareDataRequest;

fn bench_firmware_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("firmware_data");

    let image_size: u32 = 1024 * 1024;
    let package = MemoryPackage::new((0..image_size).map(|i| (i % 256) as u8).collect::<Vec<_>>());
    let component = ComponentImageInfo {
        classification: 0x000A,
        identifier: 1,
        comparison_stamp: 1,
        options: 0,
        requested_activation_method: 0,
        size: image_size,
        package_offset: 0,
        version: "bench".to_string(),
    };

    for length in [32u32, 1024, 4096].iter() {
        let request = RequestFirmwareDataRequest {
            offset: image_size / 2,
            length: *length,
        };

        group.throughput(Throughput::Bytes(u64::from(*length)));
        group.bench_with_input(BenchmarkId::new("serve", length), &request, |b, request| {
            b.iter(|| {
                let window =
                    plan_firmware_data(image_size, request, 32, 4096).expect("window in range");
                read_firmware_data(&package, &component, &window).expect("read succeeds")
            });
        });
    }

    group.finish();
}

fn bench_instance_ids(c: &mut Criterion) {
    let allocator = Arc::new(InstanceIdAllocator::new(Duration::from_secs(5)));

    c.bench_function("lease_and_release", |b| {
        b.iter(|| allocator.lease(9).expect("id available"));
    });
}

criterion_group!(benches, bench_firmware_data, bench_instance_ids);
criterion_main!(benches);
