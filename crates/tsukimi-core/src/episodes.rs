//! Episode listing: which episode numbers a title may expose, and how they
//! are paged for navigation.

use std::ops::RangeInclusive;

use crate::models::{AiringStatus, MediaInfo};

/// Page size used when a title has more episodes than fit on one page.
pub const DEFAULT_EPISODE_WINDOW: u32 = 100;

/// Number of episodes that have actually aired.
///
/// Releasing titles never expose unaired episodes, so the announced total is
/// ignored for them. Finished titles trust the total; cancelled ones stopped
/// short of it and prefer the released count.
pub fn available_episode_count(media: &MediaInfo) -> u32 {
    match media.status {
        AiringStatus::NotYetReleased => 0,
        AiringStatus::Releasing | AiringStatus::Hiatus => media
            .released_episodes
            .or_else(|| media.next_airing_episode.map(|next| next.saturating_sub(1)))
            .unwrap_or(0),
        AiringStatus::Finished => media
            .total_episodes
            .or(media.released_episodes)
            .unwrap_or(0),
        AiringStatus::Cancelled => media
            .released_episodes
            .or(media.total_episodes)
            .unwrap_or(0),
    }
}

/// Split `1..=count` into display pages of `window` episodes.
///
/// Counts at or below the window produce a single range; zero produces none.
pub fn episode_ranges(count: u32, window: u32) -> Vec<RangeInclusive<u32>> {
    if count == 0 {
        return Vec::new();
    }
    if window == 0 || count <= window {
        return vec![1..=count];
    }
    (0..count.div_ceil(window))
        .map(|page| {
            let start = page * window + 1;
            start..=(start + window - 1).min(count)
        })
        .collect()
}

/// Episodes to list for `media`.
pub fn episode_list(media: &MediaInfo) -> RangeInclusive<u32> {
    match available_episode_count(media) {
        0 => RangeInclusive::new(1, 0),
        count => 1..=count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(status: AiringStatus) -> MediaInfo {
        MediaInfo {
            id: 101,
            status,
            total_episodes: Some(24),
            released_episodes: None,
            next_airing_episode: None,
        }
    }

    #[test]
    fn test_releasing_title_exposes_released_only() {
        let mut info = media(AiringStatus::Releasing);
        info.released_episodes = Some(10);
        assert_eq!(available_episode_count(&info), 10);
        let list: Vec<u32> = episode_list(&info).collect();
        assert_eq!(list, (1..=10).collect::<Vec<_>>());
        assert!(!list.contains(&11));
    }

    #[test]
    fn test_releasing_falls_back_to_next_airing() {
        let mut info = media(AiringStatus::Releasing);
        info.next_airing_episode = Some(7);
        assert_eq!(available_episode_count(&info), 6);
    }

    #[test]
    fn test_finished_title_uses_total() {
        let mut info = media(AiringStatus::Finished);
        info.released_episodes = Some(10);
        assert_eq!(available_episode_count(&info), 24);
    }

    #[test]
    fn test_not_yet_released_is_empty() {
        let info = media(AiringStatus::NotYetReleased);
        assert_eq!(available_episode_count(&info), 0);
        assert_eq!(episode_list(&info).count(), 0);
    }

    #[test]
    fn test_releasing_ignores_announced_total() {
        for status in [AiringStatus::Releasing, AiringStatus::Hiatus] {
            let info = media(status);
            assert_eq!(info.total_episodes, Some(24));
            assert_eq!(available_episode_count(&info), 0);
            assert!(episode_ranges(available_episode_count(&info), 100).is_empty());
        }
    }

    #[test]
    fn test_cancelled_prefers_released() {
        let mut info = media(AiringStatus::Cancelled);
        info.total_episodes = Some(12);
        info.released_episodes = Some(5);
        assert_eq!(available_episode_count(&info), 5);

        info.released_episodes = None;
        assert_eq!(available_episode_count(&info), 12);
    }

    #[test]
    fn test_unknown_counts_are_zero() {
        let mut info = media(AiringStatus::Releasing);
        info.total_episodes = None;
        assert_eq!(available_episode_count(&info), 0);
    }

    #[test]
    fn test_ranges_single_page() {
        assert_eq!(episode_ranges(100, 100), vec![1..=100]);
        assert_eq!(episode_ranges(24, 100), vec![1..=24]);
        assert!(episode_ranges(0, 100).is_empty());
    }

    #[test]
    fn test_ranges_chunked_above_window() {
        assert_eq!(
            episode_ranges(250, 100),
            vec![1..=100, 101..=200, 201..=250]
        );
        assert_eq!(episode_ranges(1100, 100).len(), 11);
    }
}
