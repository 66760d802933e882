//! Four-player single-elimination bracket

use tracing::info;

/// Number of entrants a bracket takes
pub const BRACKET_SIZE: usize = 4;

/// Bracket progression; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BracketStage {
    NameInput,
    Semifinals,
    Final,
    Finished,
}

/// One pairing in the bracket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketMatch {
    pub player1: String,
    pub player2: String,
    /// Unset until the match reaches its score threshold
    pub winner: Option<String>,
}

impl BracketMatch {
    fn new(player1: impl Into<String>, player2: impl Into<String>) -> Self {
        Self {
            player1: player1.into(),
            player2: player2.into(),
            winner: None,
        }
    }
}

/// What a completed match did to the bracket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BracketAdvance {
    /// First semifinal done; the second one is up
    NextSemifinal,
    /// Both semifinals done; the final is seeded
    FinalSeeded,
    /// Final done
    Champion(String),
}

/// Tournament bracket state
#[derive(Debug, Clone)]
pub struct Bracket {
    players: Vec<String>,
    semifinals: Vec<BracketMatch>,
    final_match: Option<BracketMatch>,
    /// Players who advanced out of the last completed round
    winners: Vec<String>,
    stage: BracketStage,
    current_semifinal: usize,
}

impl Bracket {
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
            semifinals: Vec::new(),
            final_match: None,
            winners: Vec::new(),
            stage: BracketStage::NameInput,
            current_semifinal: 0,
        }
    }

    /// Seed the semifinals from four entrant names.
    ///
    /// Blank names become `Player N` (1-based seat number). Pairings are
    /// seats 1 v 2 and 3 v 4.
    pub fn submit_players<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), BracketError> {
        if self.stage != BracketStage::NameInput {
            return Err(BracketError::AlreadySeeded);
        }
        if names.len() != BRACKET_SIZE {
            return Err(BracketError::WrongEntrantCount(names.len()));
        }

        self.players = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.as_ref().trim();
                if name.is_empty() {
                    format!("Player {}", i + 1)
                } else {
                    name.to_string()
                }
            })
            .collect();

        self.semifinals = vec![
            BracketMatch::new(&self.players[0], &self.players[1]),
            BracketMatch::new(&self.players[2], &self.players[3]),
        ];
        self.current_semifinal = 0;
        self.stage = BracketStage::Semifinals;

        info!(players = ?self.players, "Tournament bracket seeded");
        Ok(())
    }

    /// Record the result of the match in progress and move the bracket on.
    ///
    /// The higher score wins; a level score goes to player 1.
    pub fn on_match_score_threshold(
        &mut self,
        score1: u32,
        score2: u32,
    ) -> Result<BracketAdvance, BracketError> {
        let current = match self.stage {
            BracketStage::Semifinals => &mut self.semifinals[self.current_semifinal],
            BracketStage::Final => self
                .final_match
                .as_mut()
                .ok_or(BracketError::NotInPlay(BracketStage::Final))?,
            stage => return Err(BracketError::NotInPlay(stage)),
        };

        let winner = if score2 > score1 {
            current.player2.clone()
        } else {
            current.player1.clone()
        };
        current.winner = Some(winner.clone());

        info!(
            stage = ?self.stage,
            player1 = %current.player1,
            player2 = %current.player2,
            score1,
            score2,
            winner = %winner,
            "Tournament match decided"
        );

        match self.stage {
            BracketStage::Semifinals if self.current_semifinal + 1 < self.semifinals.len() => {
                self.current_semifinal += 1;
                Ok(BracketAdvance::NextSemifinal)
            }
            BracketStage::Semifinals => {
                self.winners = self
                    .semifinals
                    .iter()
                    .filter_map(|m| m.winner.clone())
                    .collect();
                self.final_match = Some(BracketMatch::new(&self.winners[0], &self.winners[1]));
                self.stage = BracketStage::Final;
                Ok(BracketAdvance::FinalSeeded)
            }
            _ => {
                self.winners = vec![winner.clone()];
                self.stage = BracketStage::Finished;
                Ok(BracketAdvance::Champion(winner))
            }
        }
    }

    /// The pairing currently being played
    pub fn current_match(&self) -> Option<&BracketMatch> {
        match self.stage {
            BracketStage::Semifinals => self.semifinals.get(self.current_semifinal),
            BracketStage::Final => self.final_match.as_ref(),
            _ => None,
        }
    }

    pub fn stage(&self) -> BracketStage {
        self.stage
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn semifinals(&self) -> &[BracketMatch] {
        &self.semifinals
    }

    pub fn winners(&self) -> &[String] {
        &self.winners
    }

    pub fn champion(&self) -> Option<&str> {
        match self.stage {
            BracketStage::Finished => self.winners.first().map(String::as_str),
            _ => None,
        }
    }
}

impl Default for Bracket {
    fn default() -> Self {
        Self::new()
    }
}

/// Bracket errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BracketError {
    #[error("A bracket takes exactly 4 players, got {0}")]
    WrongEntrantCount(usize),

    #[error("Players were already submitted")]
    AlreadySeeded,

    #[error("No match in play at stage {0:?}")]
    NotInPlay(BracketStage),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Bracket {
        let mut bracket = Bracket::new();
        bracket
            .submit_players(&["ann", "bea", "cal", "dot"])
            .unwrap();
        bracket
    }

    #[test]
    fn three_results_finish_the_bracket() {
        let mut bracket = seeded();
        assert_eq!(bracket.stage(), BracketStage::Semifinals);
        assert_eq!(bracket.current_match().unwrap().player1, "ann");

        assert_eq!(
            bracket.on_match_score_threshold(5, 2).unwrap(),
            BracketAdvance::NextSemifinal
        );
        assert_eq!(bracket.current_match().unwrap().player1, "cal");
        assert!(bracket.winners().is_empty());

        assert_eq!(
            bracket.on_match_score_threshold(1, 5).unwrap(),
            BracketAdvance::FinalSeeded
        );
        assert_eq!(bracket.stage(), BracketStage::Final);
        assert_eq!(bracket.winners(), ["ann", "dot"]);
        let final_match = bracket.current_match().unwrap();
        assert_eq!((final_match.player1.as_str(), final_match.player2.as_str()), ("ann", "dot"));

        assert_eq!(
            bracket.on_match_score_threshold(3, 5).unwrap(),
            BracketAdvance::Champion("dot".to_string())
        );
        assert_eq!(bracket.stage(), BracketStage::Finished);
        assert_eq!(bracket.winners().len(), 1);
        assert_eq!(bracket.champion(), Some("dot"));
        assert!(bracket.current_match().is_none());
    }

    #[test]
    fn winners_has_one_entry_only_when_finished() {
        let mut bracket = seeded();
        for (s1, s2) in [(5, 0), (5, 4), (0, 5)] {
            let before = bracket.stage();
            bracket.on_match_score_threshold(s1, s2).unwrap();
            assert!(bracket.stage() >= before);
            if bracket.stage() != BracketStage::Finished {
                assert_ne!(bracket.winners().len(), 1);
            }
        }
        assert_eq!(bracket.winners(), ["cal"]);
    }

    #[test]
    fn blank_names_get_seat_placeholders() {
        let mut bracket = Bracket::new();
        bracket.submit_players(&["", "bea", "  ", "dot"]).unwrap();
        assert_eq!(bracket.players(), ["Player 1", "bea", "Player 3", "dot"]);
        assert_eq!(bracket.semifinals()[1].player1, "Player 3");
    }

    #[test]
    fn entrant_count_must_be_four() {
        let mut bracket = Bracket::new();
        assert_eq!(
            bracket.submit_players(&["a", "b", "c"]),
            Err(BracketError::WrongEntrantCount(3))
        );
        assert_eq!(bracket.stage(), BracketStage::NameInput);
    }

    #[test]
    fn results_outside_play_are_rejected() {
        let mut bracket = Bracket::new();
        assert_eq!(
            bracket.on_match_score_threshold(5, 0),
            Err(BracketError::NotInPlay(BracketStage::NameInput))
        );

        let mut bracket = seeded();
        for _ in 0..3 {
            bracket.on_match_score_threshold(5, 0).unwrap();
        }
        assert_eq!(
            bracket.on_match_score_threshold(5, 0),
            Err(BracketError::NotInPlay(BracketStage::Finished))
        );
        assert_eq!(
            bracket.submit_players(&["a", "b", "c", "d"]),
            Err(BracketError::AlreadySeeded)
        );
    }
}
