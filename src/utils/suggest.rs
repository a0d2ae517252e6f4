fn normalize_token(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn score(input: &str, candidate: &str) -> Option<usize> {
    let a = normalize_token(input);
    let b = normalize_token(candidate);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(0);
    }
    if a.contains(&b) || b.contains(&a) {
        return Some(1);
    }
    let allowed = match a.len() {
        0..=4 => 1,
        5..=8 => 2,
        n => ((n as f32) * 0.35).floor().max(3.0) as usize,
    };
    let distance = levenshtein(&a, &b);
    (distance <= allowed).then_some(distance)
}

/// Closest candidates to `input`, best first.
pub fn suggest<S: AsRef<str>>(input: &str, candidates: &[S], limit: usize) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(&str, usize)> = candidates
        .iter()
        .map(|c| c.as_ref())
        .filter_map(|c| score(input, c).map(|s| (c, s)))
        .collect();
    scored.sort_by(|a, b| {
        a.1.cmp(&b.1)
            .then_with(|| a.0.len().cmp(&b.0.len()))
            .then_with(|| a.0.cmp(b.0))
    });
    let mut out: Vec<String> = Vec::new();
    for (candidate, _) in scored {
        if out.iter().any(|c| c == candidate) {
            continue;
        }
        out.push(candidate.to_string());
        if out.len() >= limit.max(1) {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::suggest;

    #[test]
    fn suggests_close_operation_names() {
        let ops = ["list_assignments", "get_assignment", "list_releases"];
        let out = suggest("list_assignment", &ops, 3);
        assert_eq!(out.first().map(String::as_str), Some("list_assignments"));
    }

    #[test]
    fn returns_nothing_for_unrelated_input() {
        let ops = ["deploy", "list_sets"];
        assert!(suggest("zzzzzzzzzzzz", &ops, 3).is_empty());
    }
}
