//! Ascii maze game
//!
//! A small built-in grid game used as the reference engine. Levels are ascii
//! maps made of the symbols below; the avatar has to reach a goal without
//! stepping into a hazard.
//!
//! ```text
//! w  wall      A  avatar   g  goal
//! h  hazard    .  floor
//! ```
//!
//! Sprite layers are reported in the order of [`SPRITES`]. Floor has no layer
//! of its own; the grid adapter derives it as the background channel.

use anyhow::{Result, anyhow, bail};

use super::{
    engine::{EngineStep, EngineVariant, GameEngine, LevelSpec, Winner},
    grid::Grid,
};

/// Sprite symbols in channel order
pub const SPRITES: [char; 4] = ['w', 'A', 'g', 'h'];

/// Symbol for an empty cell
pub const FLOOR: char = '.';

/// Number of discrete actions: nil, left, right, down, up
pub const NUM_ACTIONS: usize = 5;

/// Built-in levels, level 0 doubles as the neutral fallback level
pub const BUILTIN_LEVELS: [&str; 5] = [
    "wwwwwwwwwww\n\
     wA........w\n\
     w.........w\n\
     w...www...w\n\
     w.........w\n\
     w........gw\n\
     wwwwwwwwwww",
    "wwwwwwwww\n\
     wA..h..gw\n\
     w.......w\n\
     w..h....w\n\
     wwwwwwwww",
    "wwwwwwwwwww\n\
     wA..w.....w\n\
     w...w.www.w\n\
     w...w...w.w\n\
     w.......wgw\n\
     wwwwwwwwwww",
    "wwwwwww\n\
     wg...Aw\n\
     wwwwwww",
    "wwwwwwwwwww\n\
     w.hhh.....w\n\
     w.hgh..A..w\n\
     w.h.h.....w\n\
     w.........w\n\
     wwwwwwwwwww",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tile {
    Floor,
    Wall,
    Goal,
    Hazard,
}

/// Parsed maze level
#[derive(Debug, Clone, PartialEq)]
pub struct MazeLevel {
    height: usize,
    width: usize,
    tiles: Vec<Tile>,
    start: (usize, usize),
}

impl MazeLevel {
    /// Parse an ascii level
    ///
    /// Rows must have equal width, contain only known symbols and exactly one
    /// avatar.
    pub fn parse(ascii: &str) -> Result<Self> {
        let rows: Vec<&str> = ascii.lines().map(str::trim).filter(|r| !r.is_empty()).collect();
        if rows.is_empty() {
            bail!("level is empty");
        }

        let width = rows[0].chars().count();
        let mut tiles = Vec::with_capacity(rows.len() * width);
        let mut start = None;

        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                bail!("row {} has width {}, expected {}", y, row.chars().count(), width);
            }
            for (x, symbol) in row.chars().enumerate() {
                let tile = match symbol {
                    'w' => Tile::Wall,
                    'g' => Tile::Goal,
                    'h' => Tile::Hazard,
                    '.' => Tile::Floor,
                    'A' => {
                        if start.replace((y, x)).is_some() {
                            bail!("level has more than one avatar");
                        }
                        Tile::Floor
                    }
                    other => bail!("unknown symbol {:?} at row {}, column {}", other, y, x),
                };
                tiles.push(tile);
            }
        }

        let start = start.ok_or_else(|| anyhow!("level has no avatar"))?;
        Ok(Self { height: rows.len(), width, tiles, start })
    }

    /// Level height in cells
    pub fn height(&self) -> usize {
        self.height
    }

    /// Level width in cells
    pub fn width(&self) -> usize {
        self.width
    }

    fn tile(&self, y: usize, x: usize) -> Tile {
        self.tiles[y * self.width + x]
    }
}

/// Reference [`GameEngine`] playing ascii mazes
#[derive(Debug, Clone)]
pub struct MazeEngine {
    variant: EngineVariant,
    level: MazeLevel,
    avatar: Option<(usize, usize)>,
    done: bool,
}

impl MazeEngine {
    /// Create an engine with built-in level 0 loaded
    pub fn new(variant: EngineVariant) -> Result<Self> {
        Ok(Self { variant, level: MazeLevel::parse(BUILTIN_LEVELS[0])?, avatar: None, done: false })
    }

    /// Variant this handle was created as
    pub fn variant(&self) -> EngineVariant {
        self.variant
    }

    /// Avatar position as `(row, column)` once an episode is running
    pub fn avatar(&self) -> Option<(usize, usize)> {
        self.avatar
    }

    fn render(&self, avatar: (usize, usize)) -> Grid {
        let mut grid = Grid::zeros(SPRITES.len(), self.level.height, self.level.width);
        for y in 0..self.level.height {
            for x in 0..self.level.width {
                let channel = match self.level.tile(y, x) {
                    Tile::Wall => Some(0),
                    Tile::Goal => Some(2),
                    Tile::Hazard => Some(3),
                    Tile::Floor => None,
                };
                if let Some(c) = channel {
                    grid.set(c, y, x, 1.0);
                }
            }
        }
        grid.set(1, avatar.0, avatar.1, 1.0);
        grid
    }
}

impl GameEngine for MazeEngine {
    fn load_level(&mut self, level: &LevelSpec) -> Result<()> {
        let parsed = match level {
            LevelSpec::BuiltIn(index) => {
                let ascii = BUILTIN_LEVELS
                    .get(*index)
                    .ok_or_else(|| anyhow!("no built-in level {}", index))?;
                MazeLevel::parse(ascii)?
            }
            LevelSpec::Ascii(ascii) => MazeLevel::parse(ascii)?,
        };
        self.level = parsed;
        self.avatar = None;
        self.done = false;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.avatar = Some(self.level.start);
        self.done = false;
        Ok(())
    }

    fn step(&mut self, action: i64) -> Result<EngineStep> {
        let (y, x) = self.avatar.ok_or_else(|| anyhow!("step called before reset"))?;
        if self.done {
            return Ok(EngineStep { grid: self.render((y, x)), done: true, winner: Winner::NoWinner });
        }

        let (dy, dx): (i64, i64) = match action {
            0 => (0, 0),
            1 => (0, -1),
            2 => (0, 1),
            3 => (1, 0),
            4 => (-1, 0),
            other => bail!("invalid action {}", other),
        };

        let ny = y as i64 + dy;
        let nx = x as i64 + dx;
        let inside =
            ny >= 0 && nx >= 0 && (ny as usize) < self.level.height && (nx as usize) < self.level.width;
        let next = if inside && self.level.tile(ny as usize, nx as usize) != Tile::Wall {
            (ny as usize, nx as usize)
        } else {
            (y, x)
        };
        self.avatar = Some(next);

        let winner = match self.level.tile(next.0, next.1) {
            Tile::Goal => Winner::PlayerWins,
            Tile::Hazard => Winner::PlayerLoses,
            _ => Winner::NoWinner,
        };
        self.done = winner != Winner::NoWinner;

        Ok(EngineStep { grid: self.render(next), done: self.done, winner })
    }

    fn builtin_levels(&self) -> usize {
        BUILTIN_LEVELS.len()
    }

    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }
}
