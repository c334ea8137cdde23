use anyhow::Result;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use huddle_types::models::{Feedback, points_for_rating};

use crate::models::FeedbackRow;
use crate::queries::sum_points;
use crate::{Database, now_timestamp};

pub struct NewFeedback<'a> {
    pub id: Uuid,
    pub room_id: Uuid,
    pub student_id: Uuid,
    pub author_id: Uuid,
    pub rating: u8,
    pub comment: Option<&'a str>,
}

impl Database {
    /// Record a rating and its point reward in one transaction. Returns the
    /// stored feedback and the rated profile's balance afterwards.
    ///
    /// The reward is a new ledger row rather than an update of a stored
    /// balance, so concurrent ratings of the same profile all count.
    pub fn insert_feedback(&self, new: &NewFeedback<'_>) -> Result<(Feedback, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let now = now_timestamp();
            let id = new.id.to_string();
            let student_id = new.student_id.to_string();

            tx.execute(
                "INSERT INTO feedback (id, room_id, student_id, author_id, rating, comment, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    new.room_id.to_string(),
                    student_id,
                    new.author_id.to_string(),
                    new.rating,
                    new.comment,
                    now,
                ],
            )?;

            let delta = points_for_rating(new.rating);
            tx.execute(
                "INSERT INTO point_transactions (profile_id, feedback_id, delta, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![student_id, id, delta, now],
            )?;

            let points = sum_points(&tx, &student_id)?;
            let feedback = query_feedback(&tx, "id = ?1", &id)?
                .pop()
                .ok_or_else(|| anyhow::anyhow!("feedback {} vanished after insert", id))?;
            tx.commit()?;

            info!(
                "{} rated {} {} stars in room {} (+{} points, balance {})",
                new.author_id, new.student_id, new.rating, new.room_id, delta, points
            );
            Ok((feedback, points))
        })
    }

    /// Feedback given in a room, newest first.
    pub fn list_feedback_for_room(&self, room_id: Uuid) -> Result<Vec<Feedback>> {
        self.with_conn(|conn| query_feedback(conn, "room_id = ?1", &room_id.to_string()))
    }

    /// Feedback received by a profile across all rooms, newest first.
    pub fn list_feedback_for_student(&self, student_id: Uuid) -> Result<Vec<Feedback>> {
        self.with_conn(|conn| query_feedback(conn, "student_id = ?1", &student_id.to_string()))
    }
}

fn query_feedback(conn: &Connection, filter: &str, key: &str) -> Result<Vec<Feedback>> {
    let sql = format!(
        "SELECT {} FROM feedback WHERE {} ORDER BY created_at DESC, rowid DESC",
        FeedbackRow::COLUMNS,
        filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([key], FeedbackRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(Feedback::try_from).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use huddle_types::models::Role;

    use super::*;

    struct Fixture {
        db: Arc<Database>,
        room_id: Uuid,
        student_id: Uuid,
        expert_id: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let expert_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        db.create_account(expert_id, "mei", "h", "Mei", Role::Expert).unwrap();
        db.create_account(student_id, "asha", "h", "Asha", Role::Student).unwrap();
        let room = db
            .create_room(Uuid::new_v4(), "Four-day week", "policy", expert_id, None)
            .unwrap();

        Fixture {
            db: Arc::new(db),
            room_id: room.id,
            student_id,
            expert_id,
        }
    }

    fn rating(f: &Fixture, stars: u8, comment: Option<&str>) -> (Feedback, i64) {
        f.db.insert_feedback(&NewFeedback {
            id: Uuid::new_v4(),
            room_id: f.room_id,
            student_id: f.student_id,
            author_id: f.expert_id,
            rating: stars,
            comment,
        })
        .unwrap()
    }

    #[test]
    fn five_stars_award_fifty_points() {
        let f = fixture();
        let (feedback, points) = rating(&f, 5, Some("Crisp summary"));

        assert_eq!(points, 50);
        assert_eq!(feedback.rating, 5);
        assert_eq!(feedback.comment.as_deref(), Some("Crisp summary"));
        assert_eq!(f.db.get_profile(f.student_id).unwrap().unwrap().points, 50);
    }

    #[test]
    fn concurrent_ratings_are_all_counted() {
        let f = fixture();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let db = f.db.clone();
                let (room_id, student_id, author_id) = (f.room_id, f.student_id, f.expert_id);
                thread::spawn(move || {
                    db.insert_feedback(&NewFeedback {
                        id: Uuid::new_v4(),
                        room_id,
                        student_id,
                        author_id,
                        rating: 1,
                        comment: None,
                    })
                    .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(f.db.points_for(f.student_id).unwrap(), 20);
    }

    #[test]
    fn failed_insert_leaves_no_points_behind() {
        let f = fixture();
        let result = f.db.insert_feedback(&NewFeedback {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(), // no such room
            student_id: f.student_id,
            author_id: f.expert_id,
            rating: 4,
            comment: None,
        });

        assert!(result.is_err());
        assert_eq!(f.db.points_for(f.student_id).unwrap(), 0);
    }

    #[test]
    fn store_rejects_out_of_range_rating() {
        let f = fixture();
        let result = f.db.insert_feedback(&NewFeedback {
            id: Uuid::new_v4(),
            room_id: f.room_id,
            student_id: f.student_id,
            author_id: f.expert_id,
            rating: 6,
            comment: None,
        });
        assert!(result.is_err());
        assert_eq!(f.db.points_for(f.student_id).unwrap(), 0);
    }

    #[test]
    fn listings_are_newest_first() {
        let f = fixture();
        let (first, _) = rating(&f, 3, None);
        let (second, _) = rating(&f, 4, Some("Better"));

        let in_room = f.db.list_feedback_for_room(f.room_id).unwrap();
        assert_eq!(in_room.iter().map(|fb| fb.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let received = f.db.list_feedback_for_student(f.student_id).unwrap();
        assert_eq!(received.len(), 2);
        assert!(f.db.list_feedback_for_student(f.expert_id).unwrap().is_empty());
    }
}
