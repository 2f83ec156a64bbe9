//! Discovery of the channels a pass reads.
//!
//! Dependencies are found by a textual scan for `iChannel<N>` tokens so that
//! community shader code works without a full GLSL parse. The scan sits behind
//! [`ChannelScanner`] so the compiler never depends on how it is done.

use crate::types::MAX_CHANNELS;

const CHANNEL_TOKEN: &str = "iChannel";

/// Computes the required-channel set of a pass source.
pub trait ChannelScanner: Send + Sync {
    /// Distinct channel indices referenced by `source`, ascending.
    fn required_channels(&self, source: &str) -> Vec<u8>;
}

/// Scans raw text for the literal `iChannel` followed by a decimal index.
///
/// Indices outside `0..MAX_CHANNELS` are ignored. Tokens such as
/// `iChannelResolution` carry no digits and never match.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenScanner;

impl ChannelScanner for TokenScanner {
    fn required_channels(&self, source: &str) -> Vec<u8> {
        let mut seen = [false; MAX_CHANNELS];
        let mut rest = source;
        while let Some(position) = rest.find(CHANNEL_TOKEN) {
            rest = &rest[position + CHANNEL_TOKEN.len()..];
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                continue;
            }
            if let Ok(index) = rest[..digits].parse::<usize>() {
                if index < MAX_CHANNELS {
                    seen[index] = true;
                }
            }
            rest = &rest[digits..];
        }

        seen.iter()
            .enumerate()
            .filter(|(_, used)| **used)
            .map(|(index, _)| index as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<u8> {
        TokenScanner.required_channels(source)
    }

    #[test]
    fn collects_distinct_indices_ascending() {
        let source = r#"
            vec4 a = texture(iChannel2, uv);
            vec4 b = texture(iChannel0, uv) + texture(iChannel2, uv * 2.0);
            vec4 c = texelFetch(iChannel0, ivec2(0), 0);
        "#;
        assert_eq!(scan(source), vec![0, 2]);
    }

    #[test]
    fn ignores_out_of_range_indices() {
        assert_eq!(scan("texture(iChannel16, uv) + texture(iChannel15, uv)"), vec![15]);
        assert_eq!(scan("iChannel99"), Vec::<u8>::new());
    }

    #[test]
    fn resolution_arrays_are_not_references() {
        assert!(scan("vec3 r = iChannelResolution[1];").is_empty());
        assert_eq!(scan("iChannelResolution[1] + iChannel3"), vec![3]);
    }

    #[test]
    fn matches_adjacent_tokens() {
        assert_eq!(scan("iChannel1iChannel12"), vec![1, 12]);
        assert!(scan("").is_empty());
        assert!(scan("iChannel").is_empty());
    }
}
