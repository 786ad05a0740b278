/// Split `items` into contiguous groups of at most `size`, keeping order
///
/// The last group may be smaller. A size of zero is treated as one.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}
