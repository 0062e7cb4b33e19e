//! Sabbath info repositories.
//!
//! [`SabbathRepository::get_sabbath_info`] yields a stream of results. The
//! first item answers for the week picked from the clock and the last known
//! Sabbath end. If that Sabbath turns out to be already over (the stored end
//! was stale or missing), a second item follows for the next week.
//!
//! Week keys carry no location, so cached rows and the remembered end are
//! trusted only for the coordinates recorded with the last served Sabbath.
//! Any other coordinates bypass both and overwrite the rows they fetch.
//!
//! Two implementations differ only in how a week's times are obtained:
//! [`CachedSabbathRepository`] reads the cache only, while
//! [`SyncingSabbathRepository`] falls back to the sunset API on a miss and
//! writes the result back.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, info, warn};

use crate::api::SunsetSource;
use crate::cache::SabbathCache;
use crate::calendar::SabbathCalendar;
use crate::error::SabbathError;
use crate::geocode::{resolve_label, Geocoder};
use crate::models::{Coordinates, SabbathInfo, SabbathTimes, SabbathTimesEntity, SabbathWeek};
use crate::preferences::Preferences;

pub type InfoStream<'a> = BoxStream<'a, Result<SabbathInfo, SabbathError>>;

/// Collaborators shared by both repository flavours.
#[derive(Clone)]
pub struct RepositoryContext {
    pub cache: SabbathCache,
    pub geocoder: Arc<dyn Geocoder>,
    pub preferences: Arc<Preferences>,
    pub calendar: SabbathCalendar,
}

enum Step {
    Initial,
    Revalidate { week: SabbathWeek, trust_cache: bool },
    Done,
}

#[async_trait]
pub trait SabbathRepository: Send + Sync {
    fn context(&self) -> &RepositoryContext;

    /// Sunset times for `week`. Cached rows are ignored unless `trust_cache`.
    async fn times_for_week(
        &self,
        coords: Coordinates,
        week: SabbathWeek,
        trust_cache: bool,
    ) -> Result<SabbathTimes, SabbathError>;

    /// Resolve one week into display info and remember its end for `coords`.
    async fn resolve_week(
        &self,
        coords: Coordinates,
        week: SabbathWeek,
        trust_cache: bool,
    ) -> Result<SabbathInfo, SabbathError> {
        let ctx = self.context();
        let times = self.times_for_week(coords, week, trust_cache).await?;

        if let Err(e) = ctx.preferences.remember_sabbath(times.saturday, coords).await {
            warn!(error = %e, "Failed to remember Sabbath end");
        }

        let location = resolve_label(ctx.geocoder.as_ref(), coords).await;
        Ok(SabbathInfo::new(week.key(), &times, location, ctx.calendar.now_utc()))
    }

    fn get_sabbath_info(&self, coords: Coordinates) -> InfoStream<'_> {
        stream::unfold(Step::Initial, move |step| async move {
            match step {
                Step::Done => None,
                Step::Initial => {
                    let ctx = self.context();
                    let remembered = ctx.preferences.snapshot();
                    let trust_cache = remembered
                        .last_coordinates
                        .map_or(false, |last| last.same_place(&coords));
                    let known_end = if trust_cache {
                        remembered.last_sabbath_end
                    } else {
                        debug!(?coords, "New location, ignoring cached Sabbath times");
                        None
                    };

                    let week = match ctx.calendar.week_for_query(known_end.as_ref()) {
                        Ok(week) => week,
                        Err(e) => return Some((Err(SabbathError::from(e)), Step::Done)),
                    };
                    debug!(week = %week.key(), ?known_end, "Resolving Sabbath info");

                    match self.resolve_week(coords, week, trust_cache).await {
                        Ok(info) => {
                            let next = match week.next() {
                                Some(week) if info.has_ended(ctx.calendar.now_utc()) => {
                                    Step::Revalidate { week, trust_cache }
                                }
                                _ => Step::Done,
                            };
                            Some((Ok(info), next))
                        }
                        Err(e) => Some((Err(e), Step::Done)),
                    }
                }
                Step::Revalidate { week, trust_cache } => {
                    debug!(week = %week.key(), "Sabbath already over, rolling forward");
                    Some((self.resolve_week(coords, week, trust_cache).await, Step::Done))
                }
            }
        })
        .boxed()
    }
}

/// Read a cached week, treating unreadable rows as misses.
async fn cached_times(cache: &SabbathCache, key: &str) -> Result<Option<SabbathTimes>, SabbathError> {
    match cache.get(key).await? {
        Some(entity) => match entity.to_times() {
            Ok(times) => {
                debug!(key = %key, "Cache hit");
                Ok(Some(times))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable cached Sabbath times");
                Ok(None)
            }
        },
        None => {
            debug!(key = %key, "Cache miss");
            Ok(None)
        }
    }
}

/// Serves Sabbath info from the cache only.
pub struct CachedSabbathRepository {
    ctx: RepositoryContext,
}

impl CachedSabbathRepository {
    pub fn new(ctx: RepositoryContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SabbathRepository for CachedSabbathRepository {
    fn context(&self) -> &RepositoryContext {
        &self.ctx
    }

    async fn times_for_week(
        &self,
        _coords: Coordinates,
        week: SabbathWeek,
        trust_cache: bool,
    ) -> Result<SabbathTimes, SabbathError> {
        let key = week.key();
        if !trust_cache {
            return Err(SabbathError::NotCached(key));
        }
        cached_times(&self.ctx.cache, &key)
            .await?
            .ok_or(SabbathError::NotCached(key))
    }
}

/// Serves Sabbath info from the cache, fetching and caching on a miss.
pub struct SyncingSabbathRepository {
    ctx: RepositoryContext,
    source: Arc<dyn SunsetSource>,
}

impl SyncingSabbathRepository {
    pub fn new(ctx: RepositoryContext, source: Arc<dyn SunsetSource>) -> Self {
        Self { ctx, source }
    }
}

#[async_trait]
impl SabbathRepository for SyncingSabbathRepository {
    fn context(&self) -> &RepositoryContext {
        &self.ctx
    }

    async fn times_for_week(
        &self,
        coords: Coordinates,
        week: SabbathWeek,
        trust_cache: bool,
    ) -> Result<SabbathTimes, SabbathError> {
        let key = week.key();
        if trust_cache {
            if let Some(times) = cached_times(&self.ctx.cache, &key).await? {
                return Ok(times);
            }
        }

        let times = self
            .source
            .fetch_sabbath_times(coords, week, self.ctx.calendar.timezone())
            .await?;
        self.ctx
            .cache
            .upsert(SabbathTimesEntity::from_times(&key, &times))
            .await?;
        info!(key = %key, start = %times.friday, end = %times.saturday, "Cached fresh Sabbath times");
        Ok(times)
    }
}

// ============================================================================
// Tests
// ============================================================================
