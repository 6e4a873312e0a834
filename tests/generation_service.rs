//! Behavioral tests for the shared chunk generation worker: fairness,
//! cancellation, delivery suppression and panic containment.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::unbounded;
use voxelhost::generation::{
    ChunkGenerationService, EmptyGenerator, FlatGrassGenerator, GenFlags, GenerationError,
    RequesterId, TerrainGenerator, WorldId,
};
use voxelhost::world::BlockGrid;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct PanickingGenerator;

impl TerrainGenerator for PanickingGenerator {
    fn name(&self) -> &str {
        "panicking"
    }

    fn generate(&self, _grid: &mut BlockGrid, _cx: i32, _cz: i32) -> Result<(), GenerationError> {
        panic!("deliberate test panic");
    }
}

#[test]
fn requests_are_serviced_round_robin() {
    let service = ChunkGenerationService::new();
    let (tx, rx) = unbounded();
    let generator: Arc<dyn TerrainGenerator> = Arc::new(EmptyGenerator);

    // Requester 1 floods the service before requester 2 queues anything.
    // Everything is enqueued before the worker starts so the dequeue order
    // is fully deterministic.
    for k in 0..4 {
        service.request(
            RequesterId(1),
            WorldId(1),
            100 + k,
            0,
            GenFlags::NONE,
            1,
            Arc::clone(&generator),
            tx.clone(),
        );
    }
    for k in 0..4 {
        service.request(
            RequesterId(2),
            WorldId(1),
            200 + k,
            0,
            GenFlags::NONE,
            2,
            Arc::clone(&generator),
            tx.clone(),
        );
    }
    assert_eq!(service.pending(), 8);

    service.start();
    let mut order = Vec::new();
    for _ in 0..8 {
        order.push(rx.recv_timeout(RECV_TIMEOUT).unwrap().extra);
    }
    assert_eq!(order, vec![1, 2, 1, 2, 1, 2, 1, 2]);
    service.stop();
}

#[test]
fn cancel_aborts_one_world_and_spares_no_abort() {
    let service = ChunkGenerationService::new();
    let (tx, rx) = unbounded();
    let generator: Arc<dyn TerrainGenerator> = Arc::new(EmptyGenerator);

    service.request(
        RequesterId(1),
        WorldId(1),
        0,
        0,
        GenFlags::NONE,
        0,
        Arc::clone(&generator),
        tx.clone(),
    );
    service.request(
        RequesterId(1),
        WorldId(1),
        1,
        0,
        GenFlags::NO_ABORT,
        0,
        Arc::clone(&generator),
        tx.clone(),
    );
    service.request(
        RequesterId(1),
        WorldId(2),
        2,
        0,
        GenFlags::NONE,
        0,
        Arc::clone(&generator),
        tx.clone(),
    );
    service.cancel_requests(WorldId(1));

    service.start();
    // One requester, so responses arrive in enqueue order.
    let first = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert!(first.flags.contains(GenFlags::ABORTED));
    assert!(first.grid.is_none());

    let second = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert!(!second.flags.contains(GenFlags::ABORTED));
    assert!(second.grid.is_some());

    let third = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(third.world_id, WorldId(2));
    assert!(third.grid.is_some());
    service.stop();
}

#[test]
fn no_deliver_requests_produce_no_response() {
    let service = ChunkGenerationService::new();
    let (tx, rx) = unbounded();
    let generator: Arc<dyn TerrainGenerator> = Arc::new(EmptyGenerator);

    service.request(
        RequesterId(1),
        WorldId(1),
        5,
        0,
        GenFlags::NO_DELIVER,
        0,
        Arc::clone(&generator),
        tx.clone(),
    );
    service.request(
        RequesterId(1),
        WorldId(1),
        6,
        0,
        GenFlags::NONE,
        0,
        Arc::clone(&generator),
        tx.clone(),
    );

    service.start();
    // FIFO within a requester, so once the second response arrives the
    // first request has already been processed without delivering.
    let response = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(response.cx, 6);
    assert!(rx.try_recv().is_err());
    service.stop();
}

#[test]
fn generator_panic_is_contained_and_the_worker_survives() {
    let service = ChunkGenerationService::new();
    let (tx, rx) = unbounded();

    service.request(
        RequesterId(1),
        WorldId(1),
        13,
        13,
        GenFlags::NONE,
        0,
        Arc::new(PanickingGenerator),
        tx.clone(),
    );
    service.request(
        RequesterId(1),
        WorldId(1),
        14,
        14,
        GenFlags::NONE,
        0,
        Arc::new(EmptyGenerator),
        tx.clone(),
    );

    service.start();
    let failed = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert!(failed.flags.contains(GenFlags::ABORTED));
    assert!(failed.grid.is_none());

    let next = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!((next.cx, next.cz), (14, 14));
    assert!(next.grid.is_some());
    service.stop();
}

#[test]
fn delivered_chunks_arrive_lit() {
    let service = ChunkGenerationService::new();
    let (tx, rx) = unbounded();

    service.request(
        RequesterId(1),
        WorldId(1),
        0,
        0,
        GenFlags::NONE,
        0,
        Arc::new(FlatGrassGenerator),
        tx,
    );
    service.start();

    let response = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let grid = response.grid.expect("generation should succeed");
    assert_eq!(grid.height(7, 7).unwrap(), 63);
    assert_eq!(grid.sky_light(7, 100, 7).unwrap(), 15);
    assert_eq!(grid.sky_light(7, 10, 7).unwrap(), 0);
    service.stop();
}
