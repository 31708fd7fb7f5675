// SPDX-License-Identifier: CEPL-1.0

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Extent of every level in the chain, level 0 first. Each level halves the
/// previous one and never drops below 1 on either axis.
pub fn mip_extents(width: u32, height: u32) -> Vec<(u32, u32)> {
    let levels = mip_level_count(width, height);
    let (mut w, mut h) = (width.max(1), height.max(1));
    let mut out = Vec::with_capacity(levels as usize);
    for _ in 0..levels {
        out.push((w, h));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    out
}

/// One downsampling step: blit `src_level` (at `src_extent`) into
/// `src_level + 1` (at `dst_extent`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MipBlit {
    pub src_level: u32,
    pub src_extent: (u32, u32),
    pub dst_extent: (u32, u32),
}

/// The blits that build levels `1..n` from level 0, in submission order.
pub fn mip_blits(width: u32, height: u32) -> Vec<MipBlit> {
    mip_extents(width, height)
        .windows(2)
        .enumerate()
        .map(|(i, pair)| MipBlit {
            src_level: i as u32,
            src_extent: pair[0],
            dst_extent: pair[1],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_power_of_two() {
        assert_eq!(mip_level_count(512, 512), 10);
    }

    #[test]
    fn non_power_of_two_uses_floor() {
        assert_eq!(mip_level_count(300, 200), 9);
        assert_eq!(mip_level_count(200, 300), 9);
    }

    #[test]
    fn single_pixel_has_one_level() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn extents_bottom_out_at_one() {
        let ext = mip_extents(300, 200);
        assert_eq!(ext.len(), 9);
        assert_eq!(ext[0], (300, 200));
        assert_eq!(ext[1], (150, 100));
        assert_eq!(ext[7], (2, 1));
        assert_eq!(*ext.last().unwrap(), (1, 1));
    }

    #[test]
    fn blits_chain_each_level_from_previous() {
        let blits = mip_blits(8, 2);
        assert_eq!(blits.len(), 3);
        assert_eq!(
            blits[0],
            MipBlit {
                src_level: 0,
                src_extent: (8, 2),
                dst_extent: (4, 1)
            }
        );
        for pair in blits.windows(2) {
            assert_eq!(pair[1].src_level, pair[0].src_level + 1);
            assert_eq!(pair[1].src_extent, pair[0].dst_extent);
        }
    }

    #[test]
    fn one_level_image_needs_no_blits() {
        assert!(mip_blits(1, 1).is_empty());
    }
}
