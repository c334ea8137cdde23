use chrono::Utc;
use uuid::Uuid;

use huddle_types::models::{Feedback, Participant, Role, Room, RoomStatus};

pub fn room(id: Uuid, version: i64) -> Room {
    Room {
        id,
        topic: "AI in classrooms".into(),
        domain: "education".into(),
        status: RoomStatus::Live,
        participants: vec![],
        host_id: Uuid::new_v4(),
        meeting_url: None,
        created_at: Utc::now(),
        version,
    }
}

pub fn student(name: &str) -> Participant {
    Participant {
        id: Uuid::new_v4(),
        name: name.into(),
        role: Role::Student,
    }
}

pub fn feedback(room_id: Uuid, student_id: Uuid) -> Feedback {
    Feedback {
        id: Uuid::new_v4(),
        room_id,
        student_id,
        author_id: Uuid::new_v4(),
        rating: 3,
        comment: None,
        created_at: Utc::now(),
    }
}
