use thiserror::Error;

/// A string literal passed to `import.meta.hot.accept` or `acceptExports`
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptedName {
  pub name: String,
  /// Byte offsets of the literal's contents
  pub start: usize,
  pub end: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AcceptedNames {
  pub names: Vec<AcceptedName>,
  /// The first argument was neither a string nor an array, i.e. a callback or nothing at all
  pub self_accepting: bool,
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[error("Hot accept calls only take string literals or an array of string literals")]
pub struct LexError {
  pub pos: usize,
}

#[derive(Clone, Copy, PartialEq)]
enum Container {
  Call,
  Array,
}

#[derive(Clone, Copy)]
enum State {
  In(Container),
  InString { quote: char, outer: Container },
}

/// Read the arguments of a hot accept call, starting right after its opening parenthesis.
///
/// Only literals are understood, which is all a call is allowed to contain, so the rest of the
/// module never needs parsing.
pub fn lex_accepted_names(code: &str, start: usize) -> Result<AcceptedNames, LexError> {
  let mut state = State::In(Container::Call);
  let mut names = Vec::new();
  let mut current = String::new();
  let mut current_start = start;

  let Some(rest) = code.get(start..) else {
    return Ok(AcceptedNames::default());
  };

  let mut chars = rest.char_indices().peekable();
  while let Some((offset, c)) = chars.next() {
    let pos = start + offset;

    match state {
      State::In(container) => match c {
        '\'' | '"' | '`' => {
          state = State::InString {
            quote: c,
            outer: container,
          };
          current_start = pos + c.len_utf8();
        }
        c if c.is_whitespace() => {}
        '[' if container == Container::Call => state = State::In(Container::Array),
        _ if container == Container::Call => {
          return Ok(AcceptedNames {
            names,
            self_accepting: true,
          })
        }
        ']' => break,
        ',' => {}
        _ => return Err(LexError { pos }),
      },
      State::InString { quote, outer } => {
        if c == quote {
          names.push(AcceptedName {
            name: std::mem::take(&mut current),
            start: current_start,
            end: pos,
          });

          if outer == Container::Call {
            break;
          }
          state = State::In(Container::Array);
        } else if quote == '`' && c == '$' && chars.peek().is_some_and(|(_, next)| *next == '{') {
          return Err(LexError { pos });
        } else {
          current.push(c);
        }
      }
    }
  }

  Ok(AcceptedNames {
    names,
    self_accepting: false,
  })
}
