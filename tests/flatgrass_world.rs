//! End-to-end checks of a flatgrass world through the runtime.

use voxelhost::config::RuntimeConfig;
use voxelhost::runtime::WorldRuntime;
use voxelhost::world::BlockId;

fn runtime() -> WorldRuntime {
    WorldRuntime::new(RuntimeConfig {
        autosave_ticks: None,
        ..RuntimeConfig::default()
    })
}

#[test]
fn flatgrass_columns_have_the_canonical_profile() {
    let rt = runtime();
    let world = rt
        .create_world("flat", Some("flatgrass"), None, 0, 0)
        .unwrap();
    world.load_chunk(0, 0).unwrap();

    for y in 0..=58 {
        assert_eq!(world.block_id(5, y, 5).unwrap(), BlockId::STONE, "y={}", y);
    }
    for y in 59..=62 {
        assert_eq!(world.block_id(5, y, 5).unwrap(), BlockId::DIRT, "y={}", y);
    }
    assert_eq!(world.block_id(5, 63, 5).unwrap(), BlockId::GRASS);
    assert_eq!(world.block_id(5, 64, 5).unwrap(), BlockId::AIR);

    assert_eq!(world.sky_light(5, 80, 5).unwrap(), 15);
    assert_eq!(world.sky_light(5, 30, 5).unwrap(), 0);
}

#[test]
fn prepare_spawn_loads_a_ring_of_chunks() {
    let rt = runtime();
    let world = rt
        .create_world("flat", Some("flatgrass"), None, 0, 0)
        .unwrap();

    // Default spawn sits in chunk (0, 0).
    assert_eq!(world.prepare_spawn(1), 9);
    assert_eq!(world.chunk_count(), 9);
    assert!(world.is_chunk_resident(-1, -1));
    assert!(world.is_chunk_resident(1, 1));
    assert!(!world.is_chunk_resident(2, 0));
}

#[test]
fn load_area_clips_to_bounded_worlds() {
    let rt = runtime();
    let world = rt
        .create_world("small", Some("flatgrass"), None, 32, 32)
        .unwrap();

    // A 5x5 request around the origin only has 2x2 chunks in bounds.
    assert_eq!(world.load_area(0, 0, 2), 4);
    assert_eq!(world.chunk_count(), 4);
    assert!(!world.is_chunk_resident(-1, 0));
    assert!(!world.is_chunk_resident(2, 2));
}

#[test]
fn hills_worlds_are_reproducible_from_their_seed() {
    let rt = runtime();
    let a = rt
        .create_world("a", Some("hills"), Some(777), 0, 0)
        .unwrap();
    let b = rt
        .create_world("b", Some("hills"), Some(777), 0, 0)
        .unwrap();
    a.load_chunk(1, -2).unwrap();
    b.load_chunk(1, -2).unwrap();

    for x in 16..32 {
        for z in -32..-16 {
            for y in [0, 40, 62, 63, 70, 90] {
                assert_eq!(
                    a.block_id(x, y, z).unwrap(),
                    b.block_id(x, y, z).unwrap(),
                    "mismatch at ({}, {}, {})",
                    x,
                    y,
                    z
                );
            }
        }
    }
}
