/// Bundled datasets selectable from the dataset picker
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    AndGate,
    OrGate,
    StudyHours,
    Fruit,
}

const AND_GATE: &str = "\
Input A,Input B,Output,Label
0,0,-1,FALSE
0,1,-1,FALSE
1,0,-1,FALSE
1,1,1,TRUE
";

const OR_GATE: &str = "\
Input A,Input B,Output,Label
0,0,-1,FALSE
0,1,1,TRUE
1,0,1,TRUE
1,1,1,TRUE
";

const STUDY_HOURS: &str = "\
Hours Studied,Hours Slept,Result,Label
1.0,4.0,-1,Fail
2.0,5.0,-1,Fail
1.5,7.0,-1,Fail
3.0,4.5,-1,Fail
2.5,6.0,-1,Fail
4.0,3.5,-1,Fail
5.0,7.0,1,Pass
6.0,6.5,1,Pass
5.5,8.0,1,Pass
7.0,5.5,1,Pass
4.5,8.5,1,Pass
8.0,7.0,1,Pass
";

const FRUIT: &str = "\
Weight (g),Sweetness,Fruit,Label
110,2.0,-1,Lemon
95,1.5,-1,Lemon
120,2.5,-1,Lemon
100,3.0,-1,Lemon
130,1.0,-1,Lemon
150,7.5,1,Apple
170,8.0,1,Apple
140,6.5,1,Apple
180,7.0,1,Apple
160,9.0,1,Apple
";

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::AndGate,
        Preset::OrGate,
        Preset::StudyHours,
        Preset::Fruit,
    ];

    /// Name shown in the dataset picker
    pub fn display_name(self) -> &'static str {
        match self {
            Preset::AndGate => "AND Gate",
            Preset::OrGate => "OR Gate",
            Preset::StudyHours => "Study Hours",
            Preset::Fruit => "Apples vs Lemons",
        }
    }

    pub fn csv(self) -> &'static str {
        match self {
            Preset::AndGate => AND_GATE,
            Preset::OrGate => OR_GATE,
            Preset::StudyHours => STUDY_HOURS,
            Preset::Fruit => FRUIT,
        }
    }

    /// Look a preset up by its display name, ignoring case
    pub fn from_name(name: &str) -> Option<Preset> {
        let name = name.trim();
        Preset::ALL
            .into_iter()
            .find(|preset| preset.display_name().eq_ignore_ascii_case(name))
    }
}
