//! 当前会话的投票列表

use crate::im::poll::types::Poll;

#[derive(Debug, Default, Clone)]
pub struct PollBoard {
    polls: Vec<Poll>,
}

impl PollBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn polls(&self) -> &[Poll] {
        &self.polls
    }

    pub fn get(&self, id: &str) -> Option<&Poll> {
        self.polls.iter().find(|p| p.id == id)
    }

    /// 按 ID 插入或覆盖（`poll:created` / `poll:updated` 重复投递安全）
    pub fn upsert(&mut self, poll: Poll) {
        match self.polls.iter_mut().find(|p| p.id == poll.id) {
            Some(existing) => *existing = poll,
            None => self.polls.push(poll),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::poll::types::PollOption;

    fn poll(id: &str, votes: &[&str]) -> Poll {
        Poll {
            id: id.into(),
            room_id: Some("r1".into()),
            question: "lunch?".into(),
            options: vec![
                PollOption {
                    text: "pizza".into(),
                    votes: votes.iter().map(|v| v.to_string()).collect(),
                },
                PollOption {
                    text: "sushi".into(),
                    votes: vec![],
                },
            ],
            multiple: false,
            created_by: None,
            closed: false,
            created_at: None,
        }
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut board = PollBoard::new();
        board.upsert(poll("p1", &[]));
        board.upsert(poll("p1", &["bob"]));
        board.upsert(poll("p2", &[]));
        assert_eq!(board.polls().len(), 2);
        let p1 = board.get("p1").unwrap();
        assert_eq!(p1.total_votes(), 1);
        assert_eq!(p1.voted_options("bob"), vec![0]);
    }
}
