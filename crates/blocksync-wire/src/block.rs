//! Block size selection.
//!
//! Files are cut into fixed-size blocks for transfer. The block size for a
//! file is a pure function of its size: the smallest size from the table
//! that keeps the file under [`DESIRED_PER_FILE_BLOCKS`] blocks, clamped to
//! [`MAX_BLOCK_SIZE`].

/// The minimum block size allowed (128 KiB)
pub const MIN_BLOCK_SIZE: usize = 128 << 10;

/// The maximum block size allowed (16 MiB)
pub const MAX_BLOCK_SIZE: usize = 16 << 20;

/// The number of blocks we aim for per file
pub const DESIRED_PER_FILE_BLOCKS: i64 = 2000;

/// The valid block sizes, powers of two from min to max
pub const BLOCK_SIZES: [usize; 8] = [
    128 << 10,
    256 << 10,
    512 << 10,
    1 << 20,
    2 << 20,
    4 << 20,
    8 << 20,
    16 << 20,
];

/// Returns the block size to use for a file of the given size.
pub fn block_size(file_size: i64) -> usize {
    let mut selected = MAX_BLOCK_SIZE;
    for &candidate in &BLOCK_SIZES {
        if file_size < DESIRED_PER_FILE_BLOCKS * candidate as i64 {
            selected = candidate;
            break;
        }
    }
    selected
}
