//! Starter notes for an empty database.

/// A seed note: title, markdown body and comma-separated tags.
#[derive(Debug, Clone, Copy)]
pub struct SampleNote {
    pub title: &'static str,
    pub content: &'static str,
    pub tags: &'static str,
}

/// Inserted by [`SqliteNoteStore::seed_sample_notes`](crate::SqliteNoteStore::seed_sample_notes).
pub const SAMPLE_NOTES: &[SampleNote] = &[
    SampleNote {
        title: "Python FastAPI Quick Start",
        content: "# FastAPI Quick Start Guide\n\n\
            Install with `pip install fastapi uvicorn`, declare an app and run it\n\
            with `uvicorn main:app --reload`. Path parameters and request bodies\n\
            are validated from type hints.",
        tags: "python, fastapi, api, web development",
    },
    SampleNote {
        title: "React Hooks Cheat Sheet",
        content: "# React Hooks Reference\n\n\
            - `useState` for local state\n\
            - `useEffect` for side effects and subscriptions\n\
            - `useMemo` and `useCallback` to skip recomputation",
        tags: "javascript, react, hooks, frontend",
    },
    SampleNote {
        title: "SQL Query Optimization",
        content: "# SQL Query Optimization Tips\n\n\
            Index the columns you filter and join on, read the query plan with\n\
            `EXPLAIN`, and avoid `SELECT *` in hot paths.",
        tags: "sql, database, optimization, performance",
    },
    SampleNote {
        title: "Git Best Practices",
        content: "# Git Workflow Guide\n\n\
            Keep commits small, write messages in the imperative mood, and\n\
            rebase feature branches onto main before opening a pull request.",
        tags: "git, version control, workflow, best practices",
    },
    SampleNote {
        title: "Docker Compose Setup",
        content: "# Docker Compose for Development\n\n\
            Describe services, networks and volumes in `docker-compose.yml`,\n\
            then start everything with `docker compose up -d`.",
        tags: "docker, devops, development, containers",
    },
];
