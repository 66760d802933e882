//! Paddle and ball physics: movement, collisions, scoring

use std::f32::consts::FRAC_PI_4;

use glam::Vec2;
use rand::Rng;

use super::state::MatchState;
use super::PaddleSide;

/// Physics constants for a play mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConstants {
    /// Paddles are clamped to `[-paddle_limit, paddle_limit]`
    pub paddle_limit: f32,
    /// Paddle speed while a key is held
    pub paddle_speed: f32,
    /// Distance from paddle center to each capsule endpoint
    pub paddle_half_length: f32,
    pub paddle_radius: f32,
    pub ball_radius: f32,
    /// Extra clearance when pushing the ball off a paddle
    pub push_margin: f32,
    /// Lateral velocity added per unit of hit offset from paddle center
    pub deflection: f32,
    /// Minimum lateral speed after a paddle hit
    pub min_lateral_speed: f32,
    /// Ball speed after every paddle hit
    pub rally_speed: f32,
    /// Ball speed on serve
    pub serve_speed: f32,
    /// Maximum serve angle away from straight ahead (radians)
    pub serve_spread: f32,
    /// Side walls sit at `±wall_x`
    pub wall_x: f32,
    /// Where the ball is put back after touching a side wall
    pub wall_rebound_x: f32,
    /// A goal is scored past `±goal_depth`
    pub goal_depth: f32,
    /// Paddle 1 sits at `-paddle_depth`, paddle 2 at `+paddle_depth`
    pub paddle_depth: f32,
}

impl PhysicsConstants {
    pub const CANONICAL: Self = Self {
        paddle_limit: 9.8,
        paddle_speed: 0.5,
        paddle_half_length: 1.7,
        paddle_radius: 0.2,
        ball_radius: 0.4,
        push_margin: 0.05,
        deflection: 0.3,
        min_lateral_speed: 0.1,
        rally_speed: 0.4,
        serve_speed: 0.3,
        serve_spread: FRAC_PI_4,
        wall_x: 10.0,
        wall_rebound_x: 9.9,
        goal_depth: 16.0,
        paddle_depth: 15.0,
    };

    /// Combined paddle and ball radius used by the capsule test
    pub fn contact_radius(&self) -> f32 {
        self.paddle_radius + self.ball_radius
    }

    /// Depth coordinate of a paddle
    pub fn paddle_z(&self, side: PaddleSide) -> f32 {
        match side {
            PaddleSide::One => -self.paddle_depth,
            PaddleSide::Two => self.paddle_depth,
        }
    }
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// A goal registered during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreEvent {
    pub scorer: PaddleSide,
    pub score1: u32,
    pub score2: u32,
}

/// Physics system for advancing a match
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance the match by `dt`.
    ///
    /// Order: paddles, ball integration, paddle collisions (paddle 1 first),
    /// side walls, then scoring. Returns the goal scored this tick, if any.
    pub fn advance<R: Rng>(
        state: &mut MatchState,
        dt: f32,
        constants: &PhysicsConstants,
        rng: &mut R,
    ) -> Option<ScoreEvent> {
        let dt = dt.max(0.0);

        state.paddle1_pos = Self::move_paddle(state.paddle1_pos, state.paddle1_speed, dt, constants);
        state.paddle2_pos = Self::move_paddle(state.paddle2_pos, state.paddle2_speed, dt, constants);

        state.ball_pos += state.ball_velocity * dt;

        for side in [PaddleSide::One, PaddleSide::Two] {
            let paddle = Vec2::new(state.paddle_pos(side), constants.paddle_z(side));
            if Self::check_paddle_collision(state.ball_pos, paddle, constants) {
                Self::resolve_paddle_collision(
                    &mut state.ball_pos,
                    &mut state.ball_velocity,
                    paddle,
                    constants,
                );
            }
        }

        Self::reflect_walls(&mut state.ball_pos, &mut state.ball_velocity, constants);

        let scorer = Self::detect_score(state, constants)?;
        match scorer {
            PaddleSide::One => state.score1 += 1,
            PaddleSide::Two => state.score2 += 1,
        }
        state.ball_pos = Vec2::ZERO;
        state.ball_velocity = Self::serve_velocity(rng, constants);

        Some(ScoreEvent {
            scorer,
            score1: state.score1,
            score2: state.score2,
        })
    }

    /// Move a paddle and clamp it to the court
    pub fn move_paddle(pos: f32, speed: f32, dt: f32, constants: &PhysicsConstants) -> f32 {
        (pos + speed * dt).clamp(-constants.paddle_limit, constants.paddle_limit)
    }

    /// Capsule test between the ball and a paddle centered at `paddle`
    pub fn check_paddle_collision(ball: Vec2, paddle: Vec2, constants: &PhysicsConstants) -> bool {
        let reach = constants.contact_radius();
        let dx = (ball.x - paddle.x).abs();
        let dz = (ball.y - paddle.y).abs();

        if dx < constants.paddle_half_length && dz < reach {
            return true;
        }

        // Rounded capsule ends
        let left_end = Vec2::new(paddle.x - constants.paddle_half_length, paddle.y);
        let right_end = Vec2::new(paddle.x + constants.paddle_half_length, paddle.y);
        ball.distance(left_end) < reach || ball.distance(right_end) < reach
    }

    /// Push the ball off a paddle and send it back with a deflection
    pub fn resolve_paddle_collision(
        ball_pos: &mut Vec2,
        velocity: &mut Vec2,
        paddle: Vec2,
        constants: &PhysicsConstants,
    ) {
        let push = constants.contact_radius() + constants.push_margin;
        ball_pos.y = if velocity.y > 0.0 {
            paddle.y - push
        } else {
            paddle.y + push
        };
        velocity.y = -velocity.y;

        let offset = ball_pos.x - paddle.x;
        velocity.x += offset * constants.deflection;

        if velocity.x.abs() < constants.min_lateral_speed {
            velocity.x = if velocity.x > 0.0 {
                constants.min_lateral_speed
            } else {
                -constants.min_lateral_speed
            };
        }

        *velocity = velocity.normalize_or_zero() * constants.rally_speed;
    }

    /// Bounce the ball off the side walls
    pub fn reflect_walls(ball_pos: &mut Vec2, velocity: &mut Vec2, constants: &PhysicsConstants) {
        if ball_pos.x <= -constants.wall_x {
            ball_pos.x = -constants.wall_rebound_x;
            velocity.x = velocity.x.abs();
        } else if ball_pos.x >= constants.wall_x {
            ball_pos.x = constants.wall_rebound_x;
            velocity.x = -velocity.x.abs();
        }
    }

    /// Which side scores given the current ball depth.
    ///
    /// Past paddle 1's goal line paddle 2 scores, and the reverse. The two
    /// checks are exclusive.
    pub fn detect_score(state: &MatchState, constants: &PhysicsConstants) -> Option<PaddleSide> {
        if state.ball_pos.y < -constants.goal_depth {
            Some(PaddleSide::Two)
        } else if state.ball_pos.y > constants.goal_depth {
            Some(PaddleSide::One)
        } else {
            None
        }
    }

    /// Randomized serve: toward either player, up to `serve_spread` off axis
    pub fn serve_velocity<R: Rng>(rng: &mut R, constants: &PhysicsConstants) -> Vec2 {
        let direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let angle = rng.gen_range(-constants.serve_spread..=constants.serve_spread);

        Vec2::new(
            constants.serve_speed * angle.sin(),
            direction * constants.serve_speed * angle.cos(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const C: PhysicsConstants = PhysicsConstants::CANONICAL;
    const EPS: f32 = 1e-5;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn ball_past_side_wall_is_clamped_and_turned_inward() {
        let mut state = MatchState::new();
        state.ball_pos = Vec2::new(9.95, 0.0);
        state.ball_velocity = Vec2::new(0.3, 0.1);

        let goal = PhysicsSystem::advance(&mut state, 0.5, &C, &mut rng());

        assert!(goal.is_none());
        assert_eq!(state.ball_pos.x, 9.9);
        assert!(state.ball_velocity.x < 0.0);
        assert_eq!(state.ball_velocity.x, -0.3);
    }

    #[test]
    fn left_wall_bounces_to_the_right() {
        let mut pos = Vec2::new(-10.2, 3.0);
        let mut vel = Vec2::new(-0.2, 0.1);
        PhysicsSystem::reflect_walls(&mut pos, &mut vel, &C);
        assert_eq!(pos.x, -9.9);
        assert_eq!(vel.x, 0.2);
    }

    #[test]
    fn paddle_hit_flips_depth_and_renormalizes() {
        let mut state = MatchState::new();
        state.paddle1_pos = 0.0;
        state.ball_pos = Vec2::new(0.5, -14.9);
        state.ball_velocity = Vec2::new(0.0, -0.3);

        let goal = PhysicsSystem::advance(&mut state, 0.5, &C, &mut rng());

        assert!(goal.is_none());
        assert!(state.ball_velocity.y > 0.0);
        assert!((state.ball_velocity.length() - C.rally_speed).abs() < EPS);
        // Pushed out in front of paddle 1 and deflected toward the hit side
        assert!((state.ball_pos.y - (-15.0 + 0.65)).abs() < EPS);
        assert!(state.ball_velocity.x > 0.0);
    }

    #[test]
    fn capsule_end_counts_as_a_hit() {
        let paddle = Vec2::new(0.0, -15.0);
        // Beyond the flat section but within reach of the rounded end
        let ball = Vec2::new(2.1, -15.3);
        assert!(PhysicsSystem::check_paddle_collision(ball, paddle, &C));

        let far = Vec2::new(2.5, -15.3);
        assert!(!PhysicsSystem::check_paddle_collision(far, paddle, &C));
    }

    #[test]
    fn straight_hit_gets_minimum_lateral_speed() {
        let mut pos = Vec2::new(0.0, 14.8);
        let mut vel = Vec2::new(0.0, 0.4);
        PhysicsSystem::resolve_paddle_collision(&mut pos, &mut vel, Vec2::new(0.0, 15.0), &C);

        assert!(vel.y < 0.0);
        assert!(vel.x < 0.0, "zero lateral speed resolves to the negative side");
        assert!((vel.length() - C.rally_speed).abs() < EPS);
        assert!((pos.y - (15.0 - 0.65)).abs() < EPS);
    }

    #[test]
    fn goal_past_paddle_one_scores_for_player_two() {
        let mut state = MatchState::new();
        state.ball_pos = Vec2::new(5.0, -15.9);
        state.ball_velocity = Vec2::new(0.0, -0.4);

        let goal = PhysicsSystem::advance(&mut state, 0.5, &C, &mut rng()).unwrap();

        assert_eq!(goal.scorer, PaddleSide::Two);
        assert_eq!((state.score1, state.score2), (0, 1));
        assert_eq!(state.ball_pos, Vec2::ZERO);
        assert!((state.ball_velocity.length() - C.serve_speed).abs() < EPS);
    }

    #[test]
    fn goal_past_paddle_two_scores_for_player_one() {
        let mut state = MatchState::new();
        state.ball_pos = Vec2::new(-5.0, 15.9);
        state.ball_velocity = Vec2::new(0.0, 0.4);

        let goal = PhysicsSystem::advance(&mut state, 0.5, &C, &mut rng()).unwrap();
        assert_eq!(goal.scorer, PaddleSide::One);
        assert_eq!((goal.score1, goal.score2), (1, 0));
    }

    #[test]
    fn serve_stays_within_spread() {
        let mut rng = rng();
        for _ in 0..200 {
            let v = PhysicsSystem::serve_velocity(&mut rng, &C);
            assert!((v.length() - C.serve_speed).abs() < EPS);
            // Off-axis angle never exceeds 45 degrees
            assert!(v.y.abs() >= v.x.abs() - EPS);
        }
    }

    proptest! {
        #[test]
        fn paddles_stay_on_court(
            start in -9.8f32..=9.8,
            speed in prop::sample::select(vec![-0.5f32, 0.0, 0.5]),
            dt in 0.0f32..1000.0,
        ) {
            let pos = PhysicsSystem::move_paddle(start, speed, dt, &C);
            prop_assert!((-C.paddle_limit..=C.paddle_limit).contains(&pos));
        }

        #[test]
        fn any_paddle_hit_leaves_rally_speed(
            offset in -2.2f32..2.2,
            vx in -0.5f32..0.5,
            vz in 0.05f32..0.5,
        ) {
            let paddle = Vec2::new(0.0, 15.0);
            let mut pos = Vec2::new(offset, 14.7);
            let mut vel = Vec2::new(vx, vz);
            PhysicsSystem::resolve_paddle_collision(&mut pos, &mut vel, paddle, &C);
            prop_assert!((vel.length() - C.rally_speed).abs() < 1e-4);
            prop_assert!(vel.y < 0.0);
        }

        #[test]
        fn a_tick_scores_at_most_once(
            x in -9.0f32..9.0,
            z in -20.0f32..20.0,
            vx in -0.4f32..0.4,
            vz in -0.4f32..0.4,
        ) {
            let mut state = MatchState::new();
            state.ball_pos = Vec2::new(x, z);
            state.ball_velocity = Vec2::new(vx, vz);
            let before = state.score1 + state.score2;
            PhysicsSystem::advance(&mut state, 0.5, &C, &mut rng());
            prop_assert!(state.score1 + state.score2 - before <= 1);
        }
    }
}
