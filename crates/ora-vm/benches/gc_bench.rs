use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ora_vm::heap::{Heap, HeapOptions};
use ora_vm::object::Meta;
use ora_vm::tagged::Tagged;

fn small_object_meta() -> Arc<Meta> {
    Arc::new(Meta { instance_size: 16, element_size: 0, pointer_offsets: vec![], elements_are_pointers: false, defining_class: None })
}

fn linked_list_meta() -> Arc<Meta> {
    Arc::new(Meta { instance_size: 16, element_size: 0, pointer_offsets: vec![1], elements_are_pointers: false, defining_class: None })
}

fn bench_minor_collect_all_garbage(c: &mut Criterion) {
    c.bench_function("minor_collect/all_garbage", |b| {
        b.iter(|| {
            let mut heap = Heap::new(HeapOptions { new_space_bytes: 1 << 20, old_space_bytes: 1 << 20, max_heap_bytes: 0 });
            for _ in 0..2000 {
                if heap.try_alloc_young(small_object_meta(), 0).is_none() {
                    break;
                }
            }
            black_box(ora_vm::gc::minor_collect(&mut heap));
        });
    });
}

fn bench_minor_collect_linked_list_survives(c: &mut Criterion) {
    c.bench_function("minor_collect/linked_list_survives", |b| {
        b.iter(|| {
            let mut heap = Heap::new(HeapOptions { new_space_bytes: 1 << 20, old_space_bytes: 1 << 20, max_heap_bytes: 0 });
            let mut head = Tagged::NULL;
            for _ in 0..500 {
                let Some(tagged) = heap.try_alloc_young(linked_list_meta(), 0) else { break };
                let ptr = tagged.as_ptr().unwrap();
                unsafe {
                    let payload = ptr.as_ptr().add(std::mem::size_of::<ora_vm::object::BlockHeader>());
                    payload.cast::<Tagged>().add(1).write(head);
                }
                head = tagged;
            }
            let handle = heap.handles_mut().new_handle(head);
            black_box(ora_vm::gc::minor_collect(&mut heap));
            black_box(heap.handles().get(handle));
        });
    });
}

criterion_group!(benches, bench_minor_collect_all_garbage, bench_minor_collect_linked_list_survives);
criterion_main!(benches);
