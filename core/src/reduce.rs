use crate::ctx::RainbowTableCtx;

/// Reduces a digest into a password of the table's search space.
/// The step is added to the seed so that every column of a chain uses a different
/// reduction, which keeps two chains from merging when they collide at different columns.
#[inline]
pub fn reduce(digest: &[u8], step: u64, ctx: &RainbowTableCtx) -> String {
    // we can use the 8 first bytes of the digest as the seed, since it is pseudo-random.
    let mut first_bytes = [0; 8];
    let len = digest.len().min(8);
    first_bytes[..len].copy_from_slice(&digest[..len]);

    let counter = u64::from_le_bytes(first_bytes).wrapping_add(step) % ctx.n;
    counter_to_plaintext(counter, ctx)
}

/// Creates a plaintext of `ctx.max_length` characters from a counter.
/// The first character is the least significant digit.
#[inline]
pub fn counter_to_plaintext(mut counter: u64, ctx: &RainbowTableCtx) -> String {
    let base = ctx.charset.len() as u64;
    let mut plaintext = String::with_capacity(ctx.max_length);

    for _ in 0..ctx.max_length {
        plaintext.push(ctx.charset[(counter % base) as usize]);
        counter /= base;
    }

    plaintext
}

/// Creates a counter from a plaintext.
/// Returns `None` if the plaintext is not part of the table's search space.
#[inline]
pub fn plaintext_to_counter(plaintext: &str, ctx: &RainbowTableCtx) -> Option<u64> {
    let base = ctx.charset.len() as u64;
    let mut counter: u64 = 0;
    let mut charset_base: u64 = 1;
    let mut len = 0;

    for c in plaintext.chars() {
        let digit = ctx.charset.position(c)? as u64;
        counter = counter.checked_add(digit.checked_mul(charset_base)?)?;
        charset_base = charset_base.saturating_mul(base);
        len += 1;
    }

    (len == ctx.max_length).then_some(counter)
}
