use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::error::{PlaybackError, PlaybackResult};
use super::track::Track;

/// Cola de reproducción de una guild.
///
/// El orden de inserción es el orden de reproducción y se permiten duplicados.
/// Solo la `PlaybackSession` dueña la modifica, siempre bajo su lock.
#[derive(Debug, Default)]
pub struct MusicQueue {
    items: VecDeque<Track>,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final y devuelve su posición (0-based)
    pub fn push(&mut self, track: Track) -> usize {
        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        self.items.len() - 1
    }

    /// Saca el siguiente track (FIFO estricto)
    pub fn pop_next(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => info!("➡️ Siguiente en cola: {}", track.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Elimina el track en `index`
    pub fn remove_at(&mut self, index: usize) -> PlaybackResult<Track> {
        let len = self.items.len();
        let track = self
            .items
            .remove(index)
            .ok_or(PlaybackError::OutOfRange { index, len })?;

        debug!("❌ Track eliminado en posición {}: {}", index, track.title());
        Ok(track)
    }

    /// Mueve un track de `from` a `to`.
    ///
    /// `to` se interpreta sobre la cola ya acortada (un único splice), por lo que
    /// `move_track(a, b)` seguido de `move_track(b, a)` restaura el orden.
    pub fn move_track(&mut self, from: usize, to: usize) -> PlaybackResult<Track> {
        let len = self.items.len();
        if from >= len {
            return Err(PlaybackError::OutOfRange { index: from, len });
        }
        if to >= len {
            return Err(PlaybackError::OutOfRange { index: to, len });
        }
        if from == to {
            return Err(PlaybackError::NoOp { index: from });
        }

        let track = self
            .items
            .remove(from)
            .ok_or(PlaybackError::OutOfRange { index: from, len })?;
        self.items.insert(to, track.clone());

        debug!("📍 Track movido de posición {} a {}", from, to);
        Ok(track)
    }

    /// Limpia la cola y devuelve cuántos tracks se descartaron
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        if removed > 0 {
            info!("🗑️ Cola limpiada ({} canciones)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copia ordenada de la cola
    pub fn to_vec(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(Track::duration).sum()
    }

    /// Vista para mostrar, con el track que suena fuera de la cola
    pub fn info(&self, current: Option<Track>) -> QueueInfo {
        QueueInfo {
            current,
            items: self.to_vec(),
            total_duration: self.total_duration(),
        }
    }
}

/// Vista de la cola para mostrar en Discord
#[derive(Debug, Clone, Default)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub total_duration: Duration,
}

impl QueueInfo {
    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Obtiene una página específica de la cola (páginas desde 1)
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.items.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: self.items[start..end].to_vec(),
            offset: start,
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    /// Índice (0-based) del primer item de la página dentro de la cola
    pub offset: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn queue_of(titles: &[&str]) -> MusicQueue {
        let mut queue = MusicQueue::new();
        for title in titles {
            queue.push(Track::new(*title, format!("src:{title}"), UserId::new(1)));
        }
        queue
    }

    fn titles(queue: &MusicQueue) -> Vec<String> {
        queue.to_vec().iter().map(|t| t.title().to_string()).collect()
    }

    #[test]
    fn pop_next_is_fifo() {
        let mut queue = queue_of(&["A", "B", "C"]);
        assert_eq!(queue.pop_next().map(|t| t.title().to_string()), Some("A".into()));
        assert_eq!(titles(&queue), vec!["B", "C"]);
    }

    #[test]
    fn remove_out_of_range_leaves_queue_untouched() {
        let mut queue = queue_of(&["A", "B"]);
        for index in [2, 5, usize::MAX] {
            assert_eq!(
                queue.remove_at(index),
                Err(PlaybackError::OutOfRange { index, len: 2 })
            );
        }
        assert_eq!(titles(&queue), vec!["A", "B"]);
    }

    #[test]
    fn remove_returns_track() {
        let mut queue = queue_of(&["A", "B", "C"]);
        let removed = queue.remove_at(1).expect("índice válido");
        assert_eq!(removed.title(), "B");
        assert_eq!(titles(&queue), vec!["A", "C"]);
    }

    #[test]
    fn move_uses_single_splice_positions() {
        let mut queue = queue_of(&["A", "B", "C", "D"]);
        let moved = queue.move_track(0, 3).expect("movimiento válido");
        assert_eq!(moved.title(), "A");
        assert_eq!(titles(&queue), vec!["B", "C", "D", "A"]);

        queue.move_track(3, 1).expect("movimiento válido");
        assert_eq!(titles(&queue), vec!["B", "A", "C", "D"]);
    }

    #[test]
    fn move_round_trip_restores_order() {
        let original = ["A", "B", "C", "D", "E"];
        for a in 0..original.len() {
            for b in 0..original.len() {
                if a == b {
                    continue;
                }
                let mut queue = queue_of(&original);
                queue.move_track(a, b).expect("ida");
                queue.move_track(b, a).expect("vuelta");
                assert_eq!(titles(&queue), original.to_vec(), "a={a} b={b}");
            }
        }
    }

    #[test]
    fn move_rejects_same_index_and_out_of_range() {
        let mut queue = queue_of(&["A", "B"]);
        assert_eq!(queue.move_track(1, 1), Err(PlaybackError::NoOp { index: 1 }));
        assert_eq!(
            queue.move_track(2, 0),
            Err(PlaybackError::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(
            queue.move_track(0, 2),
            Err(PlaybackError::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(titles(&queue), vec!["A", "B"]);
    }

    #[test]
    fn pages_are_clamped() {
        let queue = queue_of(&["A", "B", "C", "D", "E"]);
        let info = queue.info(None);

        let second = info.get_page(2, 2);
        assert_eq!(second.total_pages, 3);
        assert_eq!(second.offset, 2);
        assert_eq!(second.items.len(), 2);

        let past_end = info.get_page(9, 2);
        assert_eq!(past_end.current_page, 3);
        assert_eq!(past_end.items.len(), 1);

        assert_eq!(QueueInfo::default().get_page(0, 10).total_pages, 1);
    }

    #[test]
    fn info_sums_only_known_durations() {
        let mut queue = queue_of(&["A"]);
        let user = UserId::new(1);
        queue.push(Track::new("B", "src:B", user).with_duration(Duration::from_secs(90)));
        queue.push(Track::new("C", "src:C", user).with_duration(Duration::from_secs(30)));

        let current = Track::new("Ahora", "src:ahora", user).with_duration(Duration::from_secs(600));
        let info = queue.info(Some(current));

        // El track actual no cuenta en la duración de la cola
        assert_eq!(info.total_duration, Duration::from_secs(120));
        assert_eq!(info.total_items(), 3);
        assert_eq!(info.current.map(|t| t.title().to_string()), Some("Ahora".into()));
    }
}
