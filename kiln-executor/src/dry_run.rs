use kiln_resolver::ResolvedGraph;

/// Renders the deterministic dry-run plan: each target's primary output name on its own line,
/// followed by each dependency name indented by one tab (in declaration order), followed by a
/// blank line. Targets appear in the graph's dependency-first order, so a dependency's block
/// always precedes the blocks of everything that depends on it.
pub fn render_plan(graph: &ResolvedGraph) -> String {
    let mut out = String::new();
    for (name, node) in graph.iter() {
        out.push_str(name);
        out.push('\n');
        for dep in &node.deps {
            out.push('\t');
            out.push_str(dep);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Writes [`render_plan`]'s output to stdout. The only filesystem touch here was already paid by
/// resolution (classifying source leaves); this function itself has no side effects.
pub fn print_plan(graph: &ResolvedGraph) {
    print!("{}", render_plan(graph));
}
