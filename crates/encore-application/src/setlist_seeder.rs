// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use encore_domain::{ArtistId, Setlist, SetlistId, SetlistSong, ShowId};
use encore_infrastructure::repositories::{SetlistRepository, SongRepository};
use rand::Rng;
use tracing::{debug, info};

use crate::catalog_import::CatalogImporter;
use crate::error::SyncResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    AlreadySeeded(SetlistId),
    Seeded { setlist_id: SetlistId, songs: usize },
    /// The artist has no songs even after a catalog import.
    NoSongs,
}

/// Creates the initial vote-able setlist for a new show from a random sample
/// of the artist's most popular songs.
pub struct SetlistSeeder {
    setlists: Arc<dyn SetlistRepository>,
    songs: Arc<dyn SongRepository>,
    importer: Arc<CatalogImporter>,
    pool_size: i64,
    seed_size: usize,
}

impl SetlistSeeder {
    pub fn new(
        setlists: Arc<dyn SetlistRepository>,
        songs: Arc<dyn SongRepository>,
        importer: Arc<CatalogImporter>,
        pool_size: i64,
        seed_size: usize,
    ) -> Self {
        Self {
            setlists,
            songs,
            importer,
            pool_size,
            seed_size,
        }
    }

    pub async fn seed_initial_setlist(
        &self,
        show_id: ShowId,
        artist_id: ArtistId,
    ) -> SyncResult<SeedOutcome> {
        if let Some(existing) = self.setlists.get_by_show(show_id).await? {
            debug!(target: "seeder", %show_id, "show already has a setlist");
            return Ok(SeedOutcome::AlreadySeeded(existing.id));
        }

        if self.songs.count_by_artist(artist_id).await? == 0 {
            debug!(target: "seeder", %artist_id, "artist has no songs, importing catalog first");
            self.importer.import_artist_catalog(artist_id).await?;
        }

        let pool = self.songs.top_by_popularity(artist_id, self.pool_size).await?;
        if pool.is_empty() {
            info!(target: "seeder", %show_id, %artist_id, "no songs to seed setlist from");
            return Ok(SeedOutcome::NoSongs);
        }

        let picked = {
            let mut rng = rand::thread_rng();
            sample_without_replacement(pool, self.seed_size, &mut rng)
        };

        let setlist = Setlist::new(show_id);
        let entries: Vec<SetlistSong> = picked
            .iter()
            .enumerate()
            .map(|(index, song)| SetlistSong::new(setlist.id, song.id, index as i64 + 1))
            .collect();

        if !self.setlists.create_with_songs(&setlist, &entries).await? {
            // lost a race with another seeder for the same show
            return Ok(match self.setlists.get_by_show(show_id).await? {
                Some(existing) => SeedOutcome::AlreadySeeded(existing.id),
                None => SeedOutcome::NoSongs,
            });
        }

        info!(target: "seeder", %show_id, setlist_id = %setlist.id, songs = entries.len(), "seeded initial setlist");
        Ok(SeedOutcome::Seeded {
            setlist_id: setlist.id,
            songs: entries.len(),
        })
    }
}

/// Partial Fisher–Yates: pick a uniform index, remove it, repeat `count`
/// times.
pub fn sample_without_replacement<T, R: Rng + ?Sized>(
    mut pool: Vec<T>,
    count: usize,
    rng: &mut R,
) -> Vec<T> {
    let take = count.min(pool.len());
    let mut picked = Vec::with_capacity(take);
    for _ in 0..take {
        let index = rng.gen_range(0..pool.len());
        picked.push(pool.remove(index));
    }
    picked
}
