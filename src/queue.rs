use crate::model::SongId;
use rand::Rng;
use rand::seq::SliceRandom;

/// Derives the play order for `song_ids` and re-anchors the cursor.
///
/// Shuffled queues are drawn fresh on every call. The cursor follows the
/// song it pointed at into the new order, or becomes `None` when that song
/// is gone.
pub fn compute_queue<R: Rng + ?Sized>(
    song_ids: &[SongId],
    shuffle: bool,
    previous_queue: &[SongId],
    previous_cursor: Option<usize>,
    rng: &mut R,
) -> (Vec<SongId>, Option<usize>) {
    let mut queue = song_ids.to_vec();
    if shuffle {
        queue.shuffle(rng);
    }

    let cursor = previous_cursor
        .and_then(|index| previous_queue.get(index))
        .and_then(|current| queue.iter().position(|id| id == current));

    (queue, cursor)
}
