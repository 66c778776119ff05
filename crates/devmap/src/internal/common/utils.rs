use std::io::Read;

/// Reads at most `count` bytes from `source` and returns them.
pub fn read_at_most<R: Read>(source: R, count: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer: Vec<u8> = Vec::with_capacity(count);
    source.take(count as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn format_comma_delimited<I: IntoIterator<Item = T>, T: ToString>(items: I) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
