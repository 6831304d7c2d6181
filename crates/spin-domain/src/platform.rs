use std::env::consts;

/// Host facts exposed to configuration as `platform.*`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Platform {
    pub kind: &'static str,
    pub exe: &'static str,
    pub windows: bool,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            kind: consts::OS,
            exe: consts::EXE_SUFFIX,
            windows: cfg!(windows),
        }
    }

    pub fn path_separator(&self) -> char {
        if self.windows {
            ';'
        } else {
            ':'
        }
    }
}
