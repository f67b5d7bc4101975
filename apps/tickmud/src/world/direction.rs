/// Movement directions, declared in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Direction::North => &["n"],
            Direction::East => &["e"],
            Direction::South => &["s"],
            Direction::West => &["w"],
            Direction::Up => &["u"],
            Direction::Down => &["d"],
        }
    }

    /// Case-insensitive lookup by full name or alias.
    pub fn find(s: &str) -> Option<Direction> {
        let s = s.trim();
        Self::ALL.into_iter().find(|d| {
            d.name().eq_ignore_ascii_case(s) || d.aliases().iter().any(|a| a.eq_ignore_ascii_case(s))
        })
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
