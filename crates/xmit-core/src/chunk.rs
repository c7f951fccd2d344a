//! Packing missing parts into bounded upload chunks.

/// Upper bound on the sum of part sizes within one chunk. A single part
/// larger than this forms a chunk by itself.
pub const MAX_CHUNK_BYTES: usize = 10 * 1024 * 1024;

/// Order parts largest first, so the biggest transfers start at the head of
/// the pipeline and overlap the remaining small ones.
pub fn sort_largest_first(parts: &mut [Vec<u8>]) {
    parts.sort_by(|a, b| b.len().cmp(&a.len()));
}

/// First-fit packing: walk the list, starting a new chunk whenever adding
/// the next part would push a non-empty chunk past `max_bytes`.
///
/// Concatenating the chunks in order yields the input list unchanged.
pub fn pack(parts: Vec<Vec<u8>>, max_bytes: usize) -> Vec<Vec<Vec<u8>>> {
    let mut chunks: Vec<Vec<Vec<u8>>> = Vec::new();
    let mut current: Vec<Vec<u8>> = Vec::new();
    let mut current_size = 0usize;

    for part in parts {
        if current_size + part.len() > max_bytes && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += part.len();
        current.push(part);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
